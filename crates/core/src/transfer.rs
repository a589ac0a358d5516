//! Chunked object transfer
//!
//! Uploads send the object header, then the payload split into fixed-size
//! chunks, then close the stream and wait for the stored address. Downloads
//! send a single request and consume an origin message followed by payload
//! chunks until the stream ends. Both stop at the next suspension point once
//! the cancellation token fires.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{TransferError, TransferStage, TransportError};
use crate::hash::{Accumulator, Hash};
use crate::ids::Address;
use crate::object::ObjectHeader;
use crate::token::{Token, Verb};
use crate::transport::{self, Channel, MAX_FRAME_SIZE, Message};

/// Default payload chunk size (3 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 3 * 1024 * 1024;

/// Room left in a frame for the token and message envelope
const CHUNK_ENVELOPE: usize = 64 * 1024;

/// Largest chunk whose hex-encoded message still fits in one frame
pub const MAX_CHUNK_SIZE: usize = (MAX_FRAME_SIZE - CHUNK_ENVELOPE) / 2;

/// Check a chunk size against `1..=MAX_CHUNK_SIZE`
pub fn check_chunk_size(size: usize) -> Result<usize, TransferError> {
    if (1..=MAX_CHUNK_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(TransferError::ChunkSize(size))
    }
}

/// Receives transfer progress
pub trait TransferObserver: Send + Sync {
    /// Transfer started; `total` is the expected payload size if known
    fn on_start(&self, _total: Option<u64>) {}

    /// `bytes` more payload bytes were sent or written
    fn on_progress(&self, _bytes: u64) {}

    fn on_finish(&self) {}
}

impl TransferObserver for () {}

/// Observer that only counts bytes
#[derive(Debug, Default)]
pub struct ByteCounter(AtomicU64);

impl ByteCounter {
    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl TransferObserver for ByteCounter {
    fn on_progress(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Upload tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Maximum bytes per chunk message
    pub chunk_size: usize,
    /// Accumulate the homomorphic hash of the streamed payload
    pub hash: bool,
    /// Fail when the streamed byte count differs from the declared length
    pub strict_length: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash: true,
            strict_length: false,
        }
    }
}

/// Result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Address reported by the peer
    pub address: Address,
    pub bytes_sent: u64,
    pub chunks: u64,
    /// Accumulated payload hash when [`UploadOptions::hash`] is set
    pub payload_hash: Option<Hash>,
}

/// Result of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub header: ObjectHeader,
    pub bytes_written: u64,
}

/// Stream one object to the peer.
///
/// The token must authorize `Put` on the header's object id. Chunks carry a
/// copy of the token. On any failure the channel is closed and the partial
/// upload is abandoned. An out-of-range chunk size is rejected before
/// anything is sent.
pub async fn upload<C, R>(
    channel: &mut C,
    token: &Token,
    header: ObjectHeader,
    reader: &mut R,
    options: &UploadOptions,
    observer: &dyn TransferObserver,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, TransferError>
where
    C: Channel + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    token.authorize(Verb::Put, &header.system.id)?;
    if let Err(e) = check_chunk_size(options.chunk_size) {
        let _ = channel.close().await;
        return Err(e);
    }

    let result = put_stream(channel, token, header, reader, options, observer, cancel).await;
    if result.is_err() {
        let _ = channel.close().await;
    }
    result
}

async fn put_stream<C, R>(
    channel: &mut C,
    token: &Token,
    header: ObjectHeader,
    reader: &mut R,
    options: &UploadOptions,
    observer: &dyn TransferObserver,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, TransferError>
where
    C: Channel + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let declared = header.system.payload_length;
    let object = header.system.id;
    tracing::debug!(%object, declared, chunk_size = options.chunk_size, "Uploading object");

    transport::send(
        channel,
        Message::PutHeader {
            header,
            token: token.clone(),
        },
        cancel,
    )
    .await
    .map_err(TransferError::interrupted(TransferStage::SendHeader))?;
    observer.on_start(Some(declared));

    let chunk_size = options.chunk_size;
    let mut buf = vec![0u8; chunk_size];
    let mut hasher = options.hash.then(Accumulator::new);
    let mut sent = 0u64;
    let mut chunks = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Canceled),
            read = read_full(reader, &mut buf) => read?,
        };
        if n == 0 {
            break;
        }

        let data = buf[..n].to_vec();
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&data);
        }
        transport::send(
            channel,
            Message::PutChunk {
                data,
                token: token.clone(),
            },
            cancel,
        )
        .await
        .map_err(TransferError::interrupted(TransferStage::SendChunk))?;

        sent += n as u64;
        chunks += 1;
        observer.on_progress(n as u64);
        tracing::trace!(chunk = chunks, bytes = n, "Sent chunk");

        if n < chunk_size {
            break;
        }
    }

    channel
        .close()
        .await
        .map_err(TransferError::stream(TransferStage::Close))?;

    if sent != declared {
        if options.strict_length {
            return Err(TransferError::LengthMismatch {
                declared,
                streamed: sent,
            });
        }
        tracing::warn!(declared, streamed = sent, "Payload length differs from header");
    }

    let address = match transport::recv(channel, cancel)
        .await
        .map_err(TransferError::interrupted(TransferStage::AwaitResult))?
    {
        Some(Message::PutResult { address }) => address,
        Some(other) => {
            return Err(TransferError::UnexpectedMessage {
                stage: TransferStage::AwaitResult,
                got: other.kind().to_string(),
            });
        }
        None => {
            return Err(TransferError::Stream {
                stage: TransferStage::AwaitResult,
                source: TransportError::Closed,
            });
        }
    };
    observer.on_finish();
    tracing::debug!(%address, bytes = sent, chunks, "Upload complete");

    Ok(UploadOutcome {
        address,
        bytes_sent: sent,
        chunks,
        payload_hash: hasher.map(|h| h.digest()),
    })
}

/// Fill `buf` unless the reader hits end of input first
async fn read_full<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Fetch one object and write its payload to `writer`.
///
/// Tombstoned objects produce no writes: an authentic tombstone yields
/// [`TransferError::ObjectRemoved`], one that fails integrity checking
/// [`TransferError::TombstoneUnverified`].
pub async fn download<C, W>(
    channel: &mut C,
    token: &Token,
    address: &Address,
    writer: &mut W,
    observer: &dyn TransferObserver,
    cancel: &CancellationToken,
) -> Result<DownloadOutcome, TransferError>
where
    C: Channel + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    token.authorize(Verb::Get, &address.object)?;

    let result = get_stream(channel, token, address, writer, observer, cancel).await;
    let _ = channel.close().await;
    result
}

async fn get_stream<C, W>(
    channel: &mut C,
    token: &Token,
    address: &Address,
    writer: &mut W,
    observer: &dyn TransferObserver,
    cancel: &CancellationToken,
) -> Result<DownloadOutcome, TransferError>
where
    C: Channel + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    tracing::debug!(%address, "Downloading object");
    transport::send(
        channel,
        Message::GetRequest {
            address: *address,
            token: token.clone(),
        },
        cancel,
    )
    .await
    .map_err(TransferError::interrupted(TransferStage::SendRequest))?;

    let origin = match transport::recv(channel, cancel)
        .await
        .map_err(TransferError::interrupted(TransferStage::Receive))?
    {
        Some(Message::GetOrigin { object }) => object,
        Some(other) => {
            return Err(TransferError::UnexpectedMessage {
                stage: TransferStage::Receive,
                got: other.kind().to_string(),
            });
        }
        None => return Err(TransferError::MissingOrigin),
    };

    if origin.header.is_tombstone() {
        return Err(match origin.header.verify() {
            Ok(()) => TransferError::ObjectRemoved(origin.header.system.id),
            Err(reason) => TransferError::TombstoneUnverified(reason),
        });
    }

    observer.on_start(Some(origin.header.system.payload_length));
    let mut written = 0u64;
    if !origin.payload.is_empty() {
        writer.write_all(&origin.payload).await?;
        written += origin.payload.len() as u64;
        observer.on_progress(origin.payload.len() as u64);
    }

    loop {
        match transport::recv(channel, cancel)
            .await
            .map_err(TransferError::interrupted(TransferStage::Receive))?
        {
            Some(Message::GetChunk { data }) => {
                writer.write_all(&data).await?;
                written += data.len() as u64;
                observer.on_progress(data.len() as u64);
            }
            Some(other) => {
                return Err(TransferError::UnexpectedMessage {
                    stage: TransferStage::Receive,
                    got: other.kind().to_string(),
                });
            }
            None => break,
        }
    }
    writer.flush().await?;
    observer.on_finish();

    let declared = origin.header.system.payload_length;
    if written != declared {
        tracing::warn!(declared, received = written, "Payload length differs from header");
    }
    tracing::debug!(%address, bytes = written, "Download complete");

    Ok(DownloadOutcome {
        header: origin.header,
        bytes_written: written,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::RemoteCode;
    use crate::identity::{Identity, KeyIdentity};
    use crate::ids::{ContainerId, ObjectId};
    use crate::memory::{self, MemoryChannel};
    use crate::object::{Header, Object};
    use crate::token::{TokenBody, ValidityWindow};

    pub(crate) fn token(verb: Verb, scope: Vec<ObjectId>) -> Token {
        let identity = KeyIdentity::from_bytes(&[5u8; 32]);
        let body = TokenBody {
            owner: identity.owner_id(),
            scope,
            window: ValidityWindow::unbounded(),
            verb,
            session_key: vec![1; 32],
        };
        let signature = identity.sign(&body.signed_data());
        Token { body, signature }
    }

    fn header(id: ObjectId, len: u64) -> ObjectHeader {
        ObjectHeader::new(
            id,
            KeyIdentity::from_bytes(&[5u8; 32]).owner_id(),
            ContainerId::new([2u8; 32]),
            len,
        )
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Fake storage peer: collects chunks, answers with the header address
    async fn accept_put(mut server: MemoryChannel) -> (ObjectHeader, Vec<Vec<u8>>) {
        let Some(Message::PutHeader { header, .. }) = server.recv().await.unwrap() else {
            panic!("expected header");
        };
        let mut chunks = Vec::new();
        while let Some(msg) = server.recv().await.unwrap() {
            match msg {
                Message::PutChunk { data, .. } => chunks.push(data),
                other => panic!("unexpected {}", other.kind()),
            }
        }
        let _ = server
            .send(Message::PutResult {
                address: header.address(),
            })
            .await;
        (header, chunks)
    }

    async fn serve_get(mut server: MemoryChannel, object: Object, chunks: Vec<Vec<u8>>) {
        let Some(Message::GetRequest { .. }) = server.recv().await.unwrap() else {
            panic!("expected get request");
        };
        server.send(Message::GetOrigin { object }).await.unwrap();
        for data in chunks {
            server.send(Message::GetChunk { data }).await.unwrap();
        }
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_splits_into_chunks() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let data = payload(5 * 1024 * 1024);
        let peer = tokio::spawn(accept_put(server));

        let counter = ByteCounter::default();
        let outcome = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, data.len() as u64),
            &mut data.as_slice(),
            &UploadOptions::default(),
            &counter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let (_, chunks) = peer.await.unwrap();

        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.bytes_sent, data.len() as u64);
        assert_eq!(outcome.address.object, id);
        assert_eq!(counter.total(), data.len() as u64);
        assert_eq!(chunks[0].len(), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks[1].len(), 2 * 1024 * 1024);
        assert_eq!(chunks.concat(), data);
        assert_eq!(outcome.payload_hash, Some(Hash::sum(&data)));
    }

    #[tokio::test]
    async fn test_upload_uneven_chunk_size() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let data = payload(1000);
        let peer = tokio::spawn(accept_put(server));

        let options = UploadOptions {
            chunk_size: 300,
            ..Default::default()
        };
        let outcome = upload(
            &mut client,
            &token(Verb::Put, vec![]),
            header(id, 1000),
            &mut data.as_slice(),
            &options,
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let (_, chunks) = peer.await.unwrap();

        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![300, 300, 300, 100]);
        assert_eq!(outcome.chunks, 4);
    }

    #[tokio::test]
    async fn test_upload_empty_payload_sends_no_chunks() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let peer = tokio::spawn(accept_put(server));

        let outcome = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, 0),
            &mut tokio::io::empty(),
            &UploadOptions::default(),
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let (_, chunks) = peer.await.unwrap();

        assert!(chunks.is_empty());
        assert_eq!(outcome.chunks, 0);
        assert_eq!(outcome.payload_hash, Some(Hash::empty()));
    }

    #[tokio::test]
    async fn test_upload_out_of_scope_sends_nothing() {
        let (mut client, mut server) = memory::pair();
        let id = ObjectId::random();

        let err = upload(
            &mut client,
            &token(Verb::Put, vec![ObjectId::random()]),
            header(id, 3),
            &mut &b"abc"[..],
            &UploadOptions::default(),
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::OutOfScope { .. }));
        drop(client);
        assert_eq!(server.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upload_strict_length() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let peer = tokio::spawn(accept_put(server));

        let options = UploadOptions {
            strict_length: true,
            ..Default::default()
        };
        let err = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, 10),
            &mut &b"abc"[..],
            &options,
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        let _ = peer.await;

        assert!(matches!(
            err,
            TransferError::LengthMismatch {
                declared: 10,
                streamed: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_upload_lenient_length_succeeds() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let peer = tokio::spawn(accept_put(server));

        let outcome = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, 10),
            &mut &b"abc"[..],
            &UploadOptions::default(),
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert_eq!(outcome.bytes_sent, 3);
    }

    #[tokio::test]
    async fn test_upload_canceled() {
        let (mut client, _server) = memory::pair();
        let id = ObjectId::random();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, 3),
            &mut &b"abc"[..],
            &UploadOptions::default(),
            &(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Canceled));
    }

    #[tokio::test]
    async fn test_upload_canceled_mid_stream() {
        let (mut client, mut server) = memory::pair();
        let id = ObjectId::random();
        let cancel = CancellationToken::new();

        // The source yields one chunk, then stalls with the writer held open
        let (mut source, mut reader) = tokio::io::duplex(64);
        let feeder = tokio::spawn(async move {
            source.write_all(&[7u8; 16]).await.unwrap();
            source
        });

        let trigger = cancel.clone();
        let peer = tokio::spawn(async move {
            let Some(Message::PutHeader { .. }) = server.recv().await.unwrap() else {
                panic!("expected put header");
            };
            let Some(Message::PutChunk { data, .. }) = server.recv().await.unwrap() else {
                panic!("expected first chunk");
            };
            trigger.cancel();
            (data, server)
        });

        let options = UploadOptions {
            chunk_size: 16,
            ..Default::default()
        };
        let err = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, 1024),
            &mut reader,
            &options,
            &(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Canceled));

        let (data, mut server) = peer.await.unwrap();
        assert_eq!(data, vec![7u8; 16]);
        assert!(server.recv().await.unwrap().is_none());
        drop(feeder.await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_rejects_chunk_size_out_of_range() {
        for chunk_size in [0, MAX_CHUNK_SIZE + 1] {
            let (mut client, mut server) = memory::pair();
            let id = ObjectId::random();
            let options = UploadOptions {
                chunk_size,
                ..Default::default()
            };

            let err = upload(
                &mut client,
                &token(Verb::Put, vec![id]),
                header(id, 3),
                &mut &b"abc"[..],
                &options,
                &(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

            assert!(matches!(err, TransferError::ChunkSize(n) if n == chunk_size));
            assert!(server.recv().await.unwrap().is_none());
        }
    }

    #[test]
    fn test_check_chunk_size_bounds() {
        assert_eq!(check_chunk_size(1).unwrap(), 1);
        assert_eq!(check_chunk_size(MAX_CHUNK_SIZE).unwrap(), MAX_CHUNK_SIZE);
        assert!(check_chunk_size(0).is_err());
        assert!(check_chunk_size(MAX_CHUNK_SIZE + 1).is_err());
        assert!(2 * MAX_CHUNK_SIZE < MAX_FRAME_SIZE);
    }

    #[tokio::test]
    async fn test_upload_remote_rejection() {
        let (mut client, mut server) = memory::pair();
        let id = ObjectId::random();
        let peer = tokio::spawn(async move {
            let _ = server.recv().await;
            server.reject(RemoteCode::PermissionDenied, "access denied").await;
            while let Ok(Some(_)) = server.recv().await {}
        });

        let err = upload(
            &mut client,
            &token(Verb::Put, vec![id]),
            header(id, 3),
            &mut &b"abc"[..],
            &UploadOptions::default(),
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        peer.await.unwrap();

        match err {
            TransferError::Stream { source, .. } => {
                assert_eq!(source.remote_code(), Some(RemoteCode::PermissionDenied))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_download_writes_origin_and_chunks() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let data = payload(100);
        let object = Object {
            header: header(id, 100),
            payload: data[..40].to_vec(),
        };
        let peer = tokio::spawn(serve_get(
            server,
            object.clone(),
            vec![data[40..70].to_vec(), data[70..].to_vec()],
        ));

        let mut sink = Vec::new();
        let counter = ByteCounter::default();
        let outcome = download(
            &mut client,
            &token(Verb::Get, vec![id]),
            &object.header.address(),
            &mut sink,
            &counter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        peer.await.unwrap();

        assert_eq!(sink, data);
        assert_eq!(outcome.bytes_written, 100);
        assert_eq!(counter.total(), 100);
        assert_eq!(outcome.header, object.header);
    }

    #[tokio::test]
    async fn test_download_authentic_tombstone() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let mut hdr = header(id, 0).with_headers([Header::Tombstone]);
        hdr.seal(&KeyIdentity::from_bytes(&[5u8; 32])).unwrap();
        let object = Object {
            header: hdr,
            payload: vec![],
        };
        let address = object.header.address();
        let peer = tokio::spawn(serve_get(server, object, vec![b"junk".to_vec()]));

        let mut sink = Vec::new();
        let err = download(
            &mut client,
            &token(Verb::Get, vec![id]),
            &address,
            &mut sink,
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        let _ = peer.await;

        assert!(matches!(err, TransferError::ObjectRemoved(removed) if removed == id));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_download_forged_tombstone() {
        let (mut client, server) = memory::pair();
        let id = ObjectId::random();
        let object = Object {
            header: header(id, 0).with_headers([Header::Tombstone]),
            payload: vec![],
        };
        let address = object.header.address();
        let peer = tokio::spawn(serve_get(server, object, vec![]));

        let mut sink = Vec::new();
        let err = download(
            &mut client,
            &token(Verb::Get, vec![]),
            &address,
            &mut sink,
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        let _ = peer.await;

        assert!(matches!(err, TransferError::TombstoneUnverified(_)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_download_empty_stream() {
        let (mut client, mut server) = memory::pair();
        let peer = tokio::spawn(async move {
            let _ = server.recv().await;
            server.close().await.unwrap();
        });

        let address = Address::new(ContainerId::new([2u8; 32]), ObjectId::random());
        let err = download(
            &mut client,
            &token(Verb::Get, vec![]),
            &address,
            &mut Vec::new(),
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        peer.await.unwrap();

        assert!(matches!(err, TransferError::MissingOrigin));
    }

    #[tokio::test]
    async fn test_download_wrong_verb() {
        let (mut client, _server) = memory::pair();
        let address = Address::new(ContainerId::new([2u8; 32]), ObjectId::random());
        let err = download(
            &mut client,
            &token(Verb::Put, vec![]),
            &address,
            &mut Vec::new(),
            &(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::OutOfScope { verb: Verb::Get, .. }));
    }

    #[tokio::test]
    async fn test_download_canceled_mid_stream() {
        let (mut client, mut server) = memory::pair();
        let id = ObjectId::random();
        let object = Object {
            header: header(id, 10),
            payload: b"abc".to_vec(),
        };
        let address = object.header.address();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let peer = tokio::spawn(async move {
            let _ = server.recv().await;
            server.send(Message::GetOrigin { object }).await.unwrap();
            trigger.cancel();
            // keep the stream open so only cancellation can end the download
            let _ = server.recv().await;
        });

        let mut sink = Vec::new();
        let err = download(
            &mut client,
            &token(Verb::Get, vec![id]),
            &address,
            &mut sink,
            &(),
            &cancel,
        )
        .await
        .unwrap_err();
        peer.await.unwrap();

        assert!(matches!(err, TransferError::Canceled));
    }
}
