//! Homomorphic hash verification
//!
//! The storage peer computes range hashes over stored payloads; the client
//! recomputes them locally and compares. A salt, when given, is XORed over
//! the range data before hashing on both sides.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::error::{TransferError, TransferStage, TransportError};
use crate::hash::{Accumulator, Hash, salt_xor_at};
use crate::ids::Address;
use crate::object::Range;
use crate::token::{Token, Verb};
use crate::transport::{self, Channel, Message};

const READ_WINDOW: usize = 64 * 1024;

/// Outcome of comparing a remote hash with a local one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Hash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Hash>,
    /// Why the check did not pass, or why it was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verification {
    fn passed(remote: Option<Hash>, local: Option<Hash>) -> Self {
        Self {
            valid: true,
            remote,
            local,
            message: None,
        }
    }

    fn failed(remote: Option<Hash>, local: Option<Hash>, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            remote,
            local,
            message: Some(message.into()),
        }
    }

    fn compare(remote: Hash, local: Hash) -> Self {
        if remote == local {
            Self::passed(Some(remote), Some(local))
        } else {
            Self::failed(Some(remote), Some(local), "hashes differ")
        }
    }
}

/// Ask the peer for the homomorphic hash of each range, in request order.
///
/// When a token is supplied it must authorize `RangeHash` on the object.
pub async fn range_hashes<C>(
    channel: &mut C,
    token: Option<&Token>,
    address: &Address,
    ranges: &[Range],
    salt: &[u8],
    cancel: &CancellationToken,
) -> Result<Vec<Hash>, TransferError>
where
    C: Channel + ?Sized,
{
    if let Some(token) = token {
        token.authorize(Verb::RangeHash, &address.object)?;
    }
    tracing::debug!(%address, ranges = ranges.len(), salted = !salt.is_empty(), "Requesting range hashes");

    let result = request_hashes(channel, token, address, ranges, salt, cancel).await;
    let _ = channel.close().await;
    result
}

async fn request_hashes<C>(
    channel: &mut C,
    token: Option<&Token>,
    address: &Address,
    ranges: &[Range],
    salt: &[u8],
    cancel: &CancellationToken,
) -> Result<Vec<Hash>, TransferError>
where
    C: Channel + ?Sized,
{
    transport::send(
        channel,
        Message::RangeHashRequest {
            address: *address,
            ranges: ranges.to_vec(),
            salt: salt.to_vec(),
            token: token.cloned(),
        },
        cancel,
    )
    .await
    .map_err(TransferError::interrupted(TransferStage::SendRequest))?;

    match transport::recv(channel, cancel)
        .await
        .map_err(TransferError::interrupted(TransferStage::Receive))?
    {
        Some(Message::RangeHashResult { hashes }) => Ok(hashes),
        Some(other) => Err(TransferError::UnexpectedMessage {
            stage: TransferStage::Receive,
            got: other.kind().to_string(),
        }),
        None => Err(TransferError::Stream {
            stage: TransferStage::Receive,
            source: TransportError::Closed,
        }),
    }
}

/// Check a freshly uploaded payload against the peer's whole-object hash.
///
/// Never fails: transport problems and mismatches are reported through the
/// returned [`Verification`].
pub async fn check_upload<C>(
    channel: &mut C,
    address: &Address,
    payload_length: u64,
    local: Hash,
    cancel: &CancellationToken,
) -> Verification
where
    C: Channel + ?Sized,
{
    let Some(range) = Range::whole(payload_length) else {
        return Verification {
            valid: true,
            remote: None,
            local: Some(local),
            message: Some("empty payload, nothing to verify".into()),
        };
    };

    match range_hashes(channel, None, address, &[range], &[], cancel).await {
        Err(e) => Verification::failed(None, Some(local), format!("can't verify: {e}")),
        Ok(hashes) => match hashes.first() {
            None => Verification::failed(None, Some(local), "received empty hash list"),
            Some(remote) => Verification::compare(*remote, local),
        },
    }
}

/// Hash `range` of a local source with `salt` applied.
///
/// Returns `Ok(None)` when the source ends before the range does.
pub async fn local_range_hash<R>(
    source: &mut R,
    range: &Range,
    salt: &[u8],
) -> std::io::Result<Option<Hash>>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    source.seek(std::io::SeekFrom::Start(range.offset)).await?;

    let mut acc = Accumulator::new();
    let mut buf = vec![0u8; READ_WINDOW];
    while acc.len() < range.length {
        let want = (range.length - acc.len()).min(READ_WINDOW as u64) as usize;
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Ok(None);
        }
        let window = salt_xor_at(&buf[..n], salt, acc.len());
        acc.update(&window);
    }
    Ok(Some(acc.digest()))
}

/// Compare the peer's salted hash of `range` with one computed from `local`.
pub async fn verify_range<C, R>(
    channel: &mut C,
    token: Option<&Token>,
    address: &Address,
    range: &Range,
    salt: &[u8],
    local: &mut R,
    cancel: &CancellationToken,
) -> Result<Verification, TransferError>
where
    C: Channel + ?Sized,
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let mut results = verify_ranges(
        channel,
        token,
        address,
        std::slice::from_ref(range),
        salt,
        local,
        cancel,
    )
    .await?;
    Ok(results.remove(0))
}

/// Fetch the peer's hashes for all `ranges` in one request, then compare
/// each with the hash of the same range of `local`.
///
/// Returns one [`Verification`] per range, in request order.
pub async fn verify_ranges<C, R>(
    channel: &mut C,
    token: Option<&Token>,
    address: &Address,
    ranges: &[Range],
    salt: &[u8],
    local: &mut R,
    cancel: &CancellationToken,
) -> Result<Vec<Verification>, TransferError>
where
    C: Channel + ?Sized,
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let hashes = range_hashes(channel, token, address, ranges, salt, cancel).await?;
    if hashes.len() != ranges.len() {
        tracing::warn!(
            requested = ranges.len(),
            received = hashes.len(),
            "Hash count differs from range count"
        );
    }

    let mut results = Vec::with_capacity(ranges.len());
    for (i, range) in ranges.iter().enumerate() {
        let Some(remote) = hashes.get(i).copied() else {
            let message = if hashes.is_empty() {
                "received empty hash list".to_string()
            } else {
                format!("no hash received for range {range}")
            };
            results.push(Verification::failed(None, None, message));
            continue;
        };

        let local_hash = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Canceled),
            hashed = local_range_hash(local, range, salt) => hashed?,
        };
        results.push(match local_hash {
            Some(local_hash) => Verification::compare(remote, local_hash),
            None => Verification::failed(
                Some(remote),
                None,
                format!("local data is shorter than range {range}"),
            ),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::salt_xor;
    use crate::ids::{ContainerId, ObjectId};
    use crate::memory::{self, MemoryChannel};
    use crate::transfer::tests::token;
    use std::io::Cursor;

    fn payload() -> Vec<u8> {
        (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn address() -> Address {
        Address::new(ContainerId::new([4u8; 32]), ObjectId::random())
    }

    /// Fake peer hashing ranges of `stored`
    async fn serve_hashes(mut server: MemoryChannel, stored: Vec<u8>) {
        let Some(Message::RangeHashRequest { ranges, salt, .. }) = server.recv().await.unwrap()
        else {
            panic!("expected range hash request");
        };
        let hashes = ranges
            .iter()
            .map(|r| {
                let slice = &stored[r.offset as usize..r.end() as usize];
                Hash::sum(&salt_xor(slice, &salt))
            })
            .collect();
        let _ = server.send(Message::RangeHashResult { hashes }).await;
    }

    #[tokio::test]
    async fn test_verify_range_matches() {
        let data = payload();
        let (mut client, server) = memory::pair();
        let peer = tokio::spawn(serve_hashes(server, data.clone()));

        let range = Range::new(1000, 150_000).unwrap();
        let result = verify_range(
            &mut client,
            None,
            &address(),
            &range,
            &[],
            &mut Cursor::new(data),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert!(result.valid, "{result:?}");
        assert_eq!(result.remote, result.local);
    }

    #[tokio::test]
    async fn test_verify_ranges_single_request() {
        let data = payload();
        let mut local = data[..150_000].to_vec();
        local[20_000] ^= 0xff;
        let (mut client, mut server) = memory::pair();
        let stored = data.clone();
        let peer = tokio::spawn(async move {
            let Some(Message::RangeHashRequest { ranges, salt, .. }) =
                server.recv().await.unwrap()
            else {
                panic!("expected range hash request");
            };
            let hashes = ranges
                .iter()
                .map(|r| Hash::sum(&salt_xor(&stored[r.offset as usize..r.end() as usize], &salt)))
                .collect();
            server
                .send(Message::RangeHashResult { hashes })
                .await
                .unwrap();
            server.close().await.unwrap();
            let extra = server.recv().await.unwrap();
            (ranges.len(), extra)
        });

        let ranges = vec![
            Range::new(0, 10_000).unwrap(),
            Range::new(15_000, 10_000).unwrap(),
            Range::new(140_000, 20_000).unwrap(),
        ];
        let results = verify_ranges(
            &mut client,
            None,
            &address(),
            &ranges,
            &[0x5a],
            &mut Cursor::new(local),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(client);
        let (requested, extra) = peer.await.unwrap();

        assert_eq!(requested, 3);
        assert!(extra.is_none());
        assert_eq!(results.len(), 3);
        assert!(results[0].valid, "{:?}", results[0]);
        assert!(!results[1].valid);
        assert_eq!(results[1].message.as_deref(), Some("hashes differ"));
        assert!(!results[2].valid);
        assert!(results[2].message.as_deref().unwrap().contains("shorter"));
    }

    #[tokio::test]
    async fn test_verify_ranges_short_hash_list() {
        let (mut client, mut server) = memory::pair();
        let peer = tokio::spawn(async move {
            let _ = server.recv().await;
            let hashes = vec![Hash::sum(&[0u8; 4])];
            let _ = server.send(Message::RangeHashResult { hashes }).await;
        });

        let ranges = vec![Range::new(0, 4).unwrap(), Range::new(4, 4).unwrap()];
        let results = verify_ranges(
            &mut client,
            None,
            &address(),
            &ranges,
            &[],
            &mut Cursor::new(vec![0u8; 8]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert!(results[0].valid);
        assert_eq!(
            results[1].message.as_deref(),
            Some("no hash received for range 4:4")
        );
    }

    #[tokio::test]
    async fn test_verify_range_salted() {
        let data = payload();
        let (mut client, server) = memory::pair();
        let peer = tokio::spawn(serve_hashes(server, data.clone()));

        let range = Range::new(7, 100_003).unwrap();
        let result = verify_range(
            &mut client,
            None,
            &address(),
            &range,
            &[0xde, 0xad, 0xbe],
            &mut Cursor::new(data),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert!(result.valid, "{result:?}");
    }

    #[tokio::test]
    async fn test_verify_range_detects_difference() {
        let data = payload();
        let mut local = data.clone();
        local[5000] ^= 1;
        let (mut client, server) = memory::pair();
        let peer = tokio::spawn(serve_hashes(server, data));

        let range = Range::new(0, 10_000).unwrap();
        let result = verify_range(
            &mut client,
            None,
            &address(),
            &range,
            &[],
            &mut Cursor::new(local),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert!(!result.valid);
        assert_eq!(result.message.as_deref(), Some("hashes differ"));
    }

    #[tokio::test]
    async fn test_verify_range_local_too_short() {
        let data = payload();
        let (mut client, server) = memory::pair();
        let peer = tokio::spawn(serve_hashes(server, data.clone()));

        let range = Range::new(0, 1000).unwrap();
        let result = verify_range(
            &mut client,
            None,
            &address(),
            &range,
            &[],
            &mut Cursor::new(data[..500].to_vec()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert!(!result.valid);
        assert!(result.local.is_none());
        assert!(result.message.unwrap().contains("shorter"));
    }

    #[tokio::test]
    async fn test_verify_range_requires_matching_token() {
        let (mut client, _server) = memory::pair();
        let addr = address();
        let range = Range::new(0, 1).unwrap();
        let wrong = token(Verb::Get, vec![addr.object]);

        let err = verify_range(
            &mut client,
            Some(&wrong),
            &addr,
            &range,
            &[],
            &mut Cursor::new(vec![0u8]),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::OutOfScope { verb: Verb::RangeHash, .. }));
    }

    #[tokio::test]
    async fn test_check_upload_reports_result() {
        let data = payload();
        let (mut client, server) = memory::pair();
        let peer = tokio::spawn(serve_hashes(server, data.clone()));

        let mut acc = Accumulator::new();
        for chunk in data.chunks(65_536) {
            acc.update(chunk);
        }
        let result = check_upload(
            &mut client,
            &address(),
            data.len() as u64,
            acc.digest(),
            &CancellationToken::new(),
        )
        .await;
        peer.await.unwrap();

        assert!(result.valid, "{result:?}");
    }

    #[tokio::test]
    async fn test_check_upload_empty_hash_list() {
        let (mut client, mut server) = memory::pair();
        let peer = tokio::spawn(async move {
            let _ = server.recv().await;
            let _ = server.send(Message::RangeHashResult { hashes: vec![] }).await;
        });

        let result = check_upload(
            &mut client,
            &address(),
            10,
            Hash::sum(b"0123456789"),
            &CancellationToken::new(),
        )
        .await;
        peer.await.unwrap();

        assert!(!result.valid);
        assert_eq!(result.message.as_deref(), Some("received empty hash list"));
    }

    #[tokio::test]
    async fn test_check_upload_request_failure_is_not_an_error() {
        let (mut client, mut server) = memory::pair();
        let peer = tokio::spawn(async move {
            let _ = server.recv().await;
            server
                .reject(crate::error::RemoteCode::Unavailable, "node busy")
                .await;
        });

        let result = check_upload(
            &mut client,
            &address(),
            10,
            Hash::sum(b"0123456789"),
            &CancellationToken::new(),
        )
        .await;
        peer.await.unwrap();

        assert!(!result.valid);
        assert!(result.message.unwrap().starts_with("can't verify"));
    }

    #[tokio::test]
    async fn test_check_upload_empty_payload() {
        let (mut client, _server) = memory::pair();
        let result = check_upload(
            &mut client,
            &address(),
            0,
            Hash::empty(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.valid);
        assert!(result.remote.is_none());
    }
}
