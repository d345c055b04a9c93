#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` implements the two layers a client and the request server
//! speak before and during a request: [`auth`] performs the HMAC-MD5
//! challenge/response handshake over raw socket bytes, and [`message`]
//! frames every subsequent exchange as length-prefixed JSON.
//!
//! # Design
//!
//! A connection always begins with [`auth::deliver_challenge`] /
//! [`auth::answer_challenge`], which run before any [`message`] framing is
//! in play. Once authenticated, both sides exclusively use
//! [`message::send_message`] and [`message::recv_message`], including for
//! the end-of-stream sentinel that closes out a request.
//!
//! # Invariants
//!
//! - Authentication always completes (success or failure) before the first
//!   framed message is sent or received on a connection.
//! - A framed message's length prefix of zero unambiguously means
//!   end-of-stream; it is never a valid length for a real JSON payload.
//!
//! # Errors
//!
//! [`auth::AuthError`] and [`message::FramingError`] are kept separate since
//! a caller dispatches on which phase of the connection it is in.
//!
//! # Examples
//!
//! See [`message::send_message`] and [`auth::deliver_challenge`] for
//! worked examples of each layer.

/// HMAC-MD5 challenge/response authentication.
pub mod auth;
/// Length-prefixed JSON message framing.
pub mod message;
