//! HMAC-MD5 challenge/response authentication, performed over raw
//! (unframed) socket bytes before the length-prefixed [`crate::message`]
//! protocol begins.

use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Marker preceding the server's nonce in the challenge frame.
pub const CHALLENGE_MARKER: &[u8] = b"#CHALLENGE#";
/// Marker sent when the client's response matched.
pub const WELCOME_MARKER: &[u8] = b"#WELCOME#";
/// Marker sent when the client's response did not match.
pub const FAILURE_MARKER: &[u8] = b"#FAILURE#";
/// Length in bytes of the random nonce sent with the challenge.
pub const NONCE_LEN: usize = 20;

/// Output size in bytes of an HMAC-MD5 digest.
const DIGEST_LEN: usize = 16;

type HmacMd5 = Hmac<Md5>;

/// Errors raised during the authentication handshake.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The peer's response digest did not match the expected one.
    #[error("authentication response did not match the expected digest")]
    ResponseMismatch,
    /// The server rejected our response (sent `#FAILURE#` instead of `#WELCOME#`).
    #[error("server rejected the authentication response")]
    Rejected,
    /// The challenge frame did not start with the expected marker.
    #[error("challenge frame did not start with the expected marker")]
    MalformedChallenge,
}

fn compute_digest(secret: &[u8], nonce: &[u8]) -> [u8; DIGEST_LEN] {
    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(nonce);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&result);
    out
}

/// Server side of the handshake: sends a fresh nonce, reads back the
/// client's digest, and replies with [`WELCOME_MARKER`] or [`FAILURE_MARKER`].
///
/// # Errors
///
/// Returns [`AuthError::Io`] if the connection fails mid-handshake, and
/// [`AuthError::ResponseMismatch`] if the client's digest is wrong (the
/// failure reply has already been sent by the time this is returned).
pub async fn deliver_challenge<S>(stream: &mut S, secret: &[u8]) -> Result<(), AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut frame = Vec::with_capacity(CHALLENGE_MARKER.len() + NONCE_LEN);
    frame.extend_from_slice(CHALLENGE_MARKER);
    frame.extend_from_slice(&nonce);
    stream.write_all(&frame).await?;
    stream.flush().await?;

    let expected = compute_digest(secret, &nonce);

    let mut response = [0u8; DIGEST_LEN];
    stream.read_exact(&mut response).await?;

    if response == expected {
        stream.write_all(WELCOME_MARKER).await?;
        stream.flush().await?;
        Ok(())
    } else {
        stream.write_all(FAILURE_MARKER).await?;
        stream.flush().await?;
        Err(AuthError::ResponseMismatch)
    }
}

/// Client side of the handshake: reads the server's challenge, replies with
/// the HMAC-MD5 digest of the nonce, and checks for [`WELCOME_MARKER`].
///
/// # Errors
///
/// Returns [`AuthError::MalformedChallenge`] if the challenge frame did not
/// start with [`CHALLENGE_MARKER`], and [`AuthError::Rejected`] if the
/// server replied with anything other than [`WELCOME_MARKER`].
pub async fn answer_challenge<S>(stream: &mut S, secret: &[u8]) -> Result<(), AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = vec![0u8; CHALLENGE_MARKER.len() + NONCE_LEN];
    stream.read_exact(&mut frame).await?;

    if frame[..CHALLENGE_MARKER.len()] != *CHALLENGE_MARKER {
        return Err(AuthError::MalformedChallenge);
    }
    let nonce = &frame[CHALLENGE_MARKER.len()..];

    let digest = compute_digest(secret, nonce);
    stream.write_all(&digest).await?;
    stream.flush().await?;

    let mut response = vec![0u8; WELCOME_MARKER.len()];
    stream.read_exact(&mut response).await?;

    if response == WELCOME_MARKER {
        Ok(())
    } else {
        Err(AuthError::Rejected)
    }
}

/// Extracts the shared secret from an auth-key file's contents: the first
/// non-empty, non-`#`-prefixed line, with surrounding whitespace trimmed.
#[must_use]
pub fn load_secret(contents: &str) -> Option<Vec<u8>> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn handshake_succeeds_with_matching_secret() {
        let (mut server, mut client) = duplex(256);
        let secret = b"shared-secret".to_vec();

        let server_secret = secret.clone();
        let server_task = tokio::spawn(async move { deliver_challenge(&mut server, &server_secret).await });
        let client_secret = secret.clone();
        let client_task = tokio::spawn(async move { answer_challenge(&mut client, &client_secret).await });

        let (server_result, client_result) = tokio::join!(server_task, client_task);
        server_result.unwrap().unwrap();
        client_result.unwrap().unwrap();
    }

    #[tokio::test]
    async fn handshake_fails_with_mismatched_secret() {
        let (mut server, mut client) = duplex(256);

        let server_task = tokio::spawn(async move { deliver_challenge(&mut server, b"server-secret").await });
        let client_task = tokio::spawn(async move { answer_challenge(&mut client, b"wrong-secret").await });

        let (server_result, client_result) = tokio::join!(server_task, client_task);
        assert!(matches!(server_result.unwrap(), Err(AuthError::ResponseMismatch)));
        assert!(matches!(client_result.unwrap(), Err(AuthError::Rejected)));
    }

    #[test]
    fn load_secret_skips_blank_and_comment_lines() {
        let contents = "# a comment\n\n  actual-secret  \nignored-second-line\n";
        assert_eq!(load_secret(contents), Some(b"actual-secret".to_vec()));
    }

    #[test]
    fn load_secret_returns_none_for_all_comments() {
        let contents = "# only\n# comments\n";
        assert_eq!(load_secret(contents), None);
    }

    #[test]
    fn digests_are_deterministic_for_the_same_inputs() {
        let a = compute_digest(b"key", b"nonce");
        let b = compute_digest(b"key", b"nonce");
        assert_eq!(a, b);
        let c = compute_digest(b"key", b"different-nonce");
        assert_ne!(a, c);
    }
}
