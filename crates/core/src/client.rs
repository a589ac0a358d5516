//! Object client
//!
//! [`ObjectClient`] ties a [`Connector`] and an [`Identity`] together and
//! opens a fresh channel per operation: one for negotiating a token, one for
//! the transfer that uses it, one for each verification request.

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::{
    HandshakeError, HandshakeStage, Result, TransferError, TransferStage, TransportError,
};
use crate::hash::Hash;
use crate::identity::Identity;
use crate::ids::{Address, ContainerId, ObjectId};
use crate::object::{self, Header, ObjectHeader, Range, SearchQuery};
use crate::session::{self, SessionRequest};
use crate::token::{Token, Verb};
use crate::transfer::{self, DownloadOutcome, TransferObserver, UploadOptions};
use crate::transport::{self, Channel, Connector, Interrupt, Message};
use crate::verify::{self, Verification};

/// Result of an upload, with the optional post-upload hash check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub address: Address,
    pub bytes_sent: u64,
    pub chunks: u64,
    pub payload_hash: Option<Hash>,
    /// Present when verification was requested
    pub verification: Option<Verification>,
}

/// Client for one storage endpoint acting as one identity
pub struct ObjectClient<K, I> {
    connector: K,
    identity: I,
}

impl<K: Connector, I: Identity> ObjectClient<K, I> {
    pub fn new(connector: K, identity: I) -> Self {
        Self {
            connector,
            identity,
        }
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Header for a new object owned by this client's identity
    pub fn object_header(
        &self,
        id: ObjectId,
        container: ContainerId,
        payload_length: u64,
        headers: impl IntoIterator<Item = Header>,
    ) -> ObjectHeader {
        ObjectHeader::new(id, self.identity.owner_id(), container, payload_length)
            .with_headers(headers)
    }

    async fn open(&self, cancel: &CancellationToken) -> std::result::Result<K::Channel, TransferError> {
        transport::connect(&self.connector, cancel)
            .await
            .map_err(TransferError::interrupted(TransferStage::Connect))
    }

    /// Negotiate a session token on a dedicated channel
    pub async fn negotiate(
        &self,
        request: SessionRequest,
        cancel: &CancellationToken,
    ) -> Result<Token> {
        let mut channel = transport::connect(&self.connector, cancel)
            .await
            .map_err(|interrupt| match interrupt {
                Interrupt::Canceled => HandshakeError::Canceled,
                Interrupt::Transport(source) => HandshakeError::Transport {
                    stage: HandshakeStage::SendInit,
                    source,
                },
            })?;
        Ok(session::negotiate(&mut channel, &self.identity, request, cancel).await?)
    }

    /// Upload one object under `token`, then optionally check the stored
    /// payload hash against the one accumulated while streaming.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload<R>(
        &self,
        token: &Token,
        header: ObjectHeader,
        reader: &mut R,
        options: &UploadOptions,
        verify: bool,
        observer: &dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<UploadReport>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let options = UploadOptions {
            hash: options.hash || verify,
            ..*options
        };
        let mut channel = self.open(cancel).await?;
        let outcome =
            transfer::upload(&mut channel, token, header, reader, &options, observer, cancel)
                .await?;

        let verification = match (verify, outcome.payload_hash) {
            (true, Some(local)) => Some(match self.open(cancel).await {
                Ok(mut channel) => {
                    verify::check_upload(
                        &mut channel,
                        &outcome.address,
                        outcome.bytes_sent,
                        local,
                        cancel,
                    )
                    .await
                }
                Err(e) => Verification {
                    valid: false,
                    remote: None,
                    local: Some(local),
                    message: Some(format!("can't verify: {e}")),
                },
            }),
            _ => None,
        };

        Ok(UploadReport {
            address: outcome.address,
            bytes_sent: outcome.bytes_sent,
            chunks: outcome.chunks,
            payload_hash: outcome.payload_hash,
            verification,
        })
    }

    /// Download one object into `writer`
    pub async fn download<W>(
        &self,
        token: &Token,
        address: &Address,
        writer: &mut W,
        observer: &dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut channel = self.open(cancel).await?;
        Ok(transfer::download(&mut channel, token, address, writer, observer, cancel).await?)
    }

    /// Store a header-only storage group object linking `members`.
    ///
    /// The token must authorize `Put` on `id`.
    pub async fn put_storage_group(
        &self,
        token: &Token,
        id: ObjectId,
        container: ContainerId,
        members: &[ObjectId],
        cancel: &CancellationToken,
    ) -> Result<Address> {
        let headers = object::storage_group_headers(members)?;
        let header = self.object_header(id, container, 0, headers);
        let options = UploadOptions {
            hash: false,
            ..Default::default()
        };
        let mut channel = self.open(cancel).await?;
        let outcome = transfer::upload(
            &mut channel,
            token,
            header,
            &mut tokio::io::empty(),
            &options,
            &(),
            cancel,
        )
        .await?;
        tracing::debug!(address = %outcome.address, members = members.len(), "Storage group stored");
        Ok(outcome.address)
    }

    /// Remove an object; the token must authorize `Delete` on it
    pub async fn delete(
        &self,
        token: &Token,
        address: &Address,
        cancel: &CancellationToken,
    ) -> Result<()> {
        token.authorize(Verb::Delete, &address.object)?;
        let request = Message::DeleteRequest {
            address: *address,
            owner: self.identity.owner_id(),
            token: token.clone(),
        };
        match self.exchange(request, cancel).await? {
            Message::DeleteResult => {
                tracing::debug!(%address, "Object deleted");
                Ok(())
            }
            other => Err(unexpected(other).into()),
        }
    }

    /// Fetch an object header
    pub async fn head(
        &self,
        address: &Address,
        full_headers: bool,
        cancel: &CancellationToken,
    ) -> Result<ObjectHeader> {
        let request = Message::HeadRequest {
            address: *address,
            full_headers,
        };
        match self.exchange(request, cancel).await? {
            Message::HeadResult { header } => Ok(header),
            other => Err(unexpected(other).into()),
        }
    }

    /// Find object addresses in a container matching `query`
    pub async fn search(
        &self,
        container: &ContainerId,
        query: SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Address>> {
        let request = Message::SearchRequest {
            container: *container,
            query,
        };
        match self.exchange(request, cancel).await? {
            Message::SearchResult { addresses } => Ok(addresses),
            other => Err(unexpected(other).into()),
        }
    }

    /// Fetch payload fragments, one per range, in request order
    pub async fn get_ranges(
        &self,
        address: &Address,
        ranges: &[Range],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u8>>> {
        let request = Message::RangeRequest {
            address: *address,
            ranges: ranges.to_vec(),
        };
        match self.exchange(request, cancel).await? {
            Message::RangeResult { fragments } => Ok(fragments),
            other => Err(unexpected(other).into()),
        }
    }

    /// Remote homomorphic hashes of salted ranges
    pub async fn range_hashes(
        &self,
        token: Option<&Token>,
        address: &Address,
        ranges: &[Range],
        salt: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<Hash>> {
        let mut channel = self.open(cancel).await?;
        Ok(verify::range_hashes(&mut channel, token, address, ranges, salt, cancel).await?)
    }

    /// Compare the remote hashes of salted ranges with a local copy, using
    /// a single range hash request
    pub async fn verify_ranges<R>(
        &self,
        token: Option<&Token>,
        address: &Address,
        ranges: &[Range],
        salt: &[u8],
        local: &mut R,
        cancel: &CancellationToken,
    ) -> Result<Vec<Verification>>
    where
        R: AsyncRead + AsyncSeek + Unpin + ?Sized,
    {
        let mut channel = self.open(cancel).await?;
        Ok(verify::verify_ranges(&mut channel, token, address, ranges, salt, local, cancel).await?)
    }

    /// One request, one reply, on a fresh channel
    async fn exchange(
        &self,
        request: Message,
        cancel: &CancellationToken,
    ) -> std::result::Result<Message, TransferError> {
        let mut channel = self.open(cancel).await?;
        let kind = request.kind();
        tracing::debug!(request = kind, endpoint = %self.connector.endpoint(), "Sending request");

        let result = async {
            transport::send(&mut channel, request, cancel)
                .await
                .map_err(TransferError::interrupted(TransferStage::SendRequest))?;
            transport::recv(&mut channel, cancel)
                .await
                .map_err(TransferError::interrupted(TransferStage::Receive))?
                .ok_or(TransferError::Stream {
                    stage: TransferStage::Receive,
                    source: TransportError::Closed,
                })
        }
        .await;
        let _ = channel.close().await;
        result
    }
}

fn unexpected(message: Message) -> TransferError {
    TransferError::UnexpectedMessage {
        stage: TransferStage::Receive,
        got: message.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use crate::error::{Error, RemoteCode};
    use crate::hash::salt_xor;
    use crate::identity::KeyIdentity;
    use crate::memory::{self, MemoryChannel, MemoryConnector};
    use crate::object::Object;
    use crate::token::{TokenBody, ValidityWindow};

    type Store = Arc<Mutex<HashMap<Address, Object>>>;

    /// In-process storage node answering every request kind
    fn spawn_node() -> (MemoryConnector, Store) {
        let (connector, mut listener) = memory::listener();
        let store: Store = Arc::default();
        let shared = store.clone();
        tokio::spawn(async move {
            while let Some(channel) = listener.accept().await {
                tokio::spawn(serve(channel, shared.clone()));
            }
        });
        (connector, store)
    }

    fn node_key() -> KeyIdentity {
        KeyIdentity::from_bytes(&[0x42; 32])
    }

    async fn serve(mut ch: MemoryChannel, store: Store) {
        let Ok(Some(first)) = ch.recv().await else {
            return;
        };
        match first {
            Message::SessionInit { token } => {
                let echo = TokenBody {
                    session_key: node_key().public_key(),
                    ..token
                };
                ch.send(Message::SessionEcho { token: echo }).await.unwrap();
                if let Ok(Some(Message::SessionConfirm { token })) = ch.recv().await {
                    let signature = node_key().sign(&token.body.signed_data());
                    let _ = ch
                        .send(Message::SessionResult {
                            token: Token {
                                body: token.body,
                                signature,
                            },
                        })
                        .await;
                }
            }
            Message::PutHeader { header, .. } => {
                let mut payload = Vec::new();
                while let Ok(Some(Message::PutChunk { data, .. })) = ch.recv().await {
                    payload.extend(data);
                }
                let address = header.address();
                store.lock().unwrap().insert(address, Object { header, payload });
                let _ = ch.send(Message::PutResult { address }).await;
            }
            Message::GetRequest { address, .. } => {
                let found = store.lock().unwrap().get(&address).cloned();
                let Some(object) = found else {
                    ch.reject(RemoteCode::NotFound, "object not found").await;
                    return;
                };
                let (first, rest) = object.payload.split_at(object.payload.len().min(4));
                let origin = Object {
                    header: object.header.clone(),
                    payload: first.to_vec(),
                };
                ch.send(Message::GetOrigin { object: origin }).await.unwrap();
                for data in rest.chunks(5) {
                    ch.send(Message::GetChunk {
                        data: data.to_vec(),
                    })
                    .await
                    .unwrap();
                }
            }
            Message::DeleteRequest { address, .. } => {
                {
                    let mut stored = store.lock().unwrap();
                    if let Some(object) = stored.get_mut(&address) {
                        let mut header = object.header.clone().with_headers([Header::Tombstone]);
                        header.system.payload_length = 0;
                        header.seal(&node_key()).unwrap();
                        *object = Object {
                            header,
                            payload: vec![],
                        };
                    }
                }
                ch.send(Message::DeleteResult).await.unwrap();
            }
            Message::HeadRequest { address, .. } => {
                let header = store.lock().unwrap().get(&address).map(|o| o.header.clone());
                match header {
                    Some(header) => ch.send(Message::HeadResult { header }).await.unwrap(),
                    None => ch.reject(RemoteCode::NotFound, "object not found").await,
                }
            }
            Message::SearchRequest { container, query } => {
                let groups_only = query
                    .filters
                    .iter()
                    .any(|f| f.name == object::STORAGE_GROUP_KEY);
                let addresses = store
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(a, o)| {
                        a.container == container && (!groups_only || o.header.is_storage_group())
                    })
                    .map(|(a, _)| *a)
                    .collect();
                ch.send(Message::SearchResult { addresses }).await.unwrap();
            }
            Message::RangeRequest { address, ranges } => {
                let payload = store.lock().unwrap()[&address].payload.clone();
                let fragments = ranges
                    .iter()
                    .map(|r| payload[r.offset as usize..r.end() as usize].to_vec())
                    .collect();
                ch.send(Message::RangeResult { fragments }).await.unwrap();
            }
            Message::RangeHashRequest {
                address,
                ranges,
                salt,
                ..
            } => {
                let payload = store.lock().unwrap()[&address].payload.clone();
                let hashes = ranges
                    .iter()
                    .map(|r| Hash::sum(&salt_xor(&payload[r.offset as usize..r.end() as usize], &salt)))
                    .collect();
                ch.send(Message::RangeHashResult { hashes }).await.unwrap();
            }
            other => panic!("unexpected request {}", other.kind()),
        }
    }

    fn client(connector: MemoryConnector) -> ObjectClient<MemoryConnector, KeyIdentity> {
        ObjectClient::new(connector, KeyIdentity::from_bytes(&[0x11; 32]))
    }

    async fn put(
        client: &ObjectClient<MemoryConnector, KeyIdentity>,
        data: &[u8],
        verify: bool,
    ) -> UploadReport {
        let cancel = CancellationToken::new();
        let id = ObjectId::random();
        let token = client
            .negotiate(SessionRequest::new(Verb::Put, [id]), &cancel)
            .await
            .unwrap();
        let header = client.object_header(id, ContainerId::new([7; 32]), data.len() as u64, []);
        let options = UploadOptions {
            chunk_size: 8,
            ..Default::default()
        };
        client
            .upload(&token, header, &mut &data[..], &options, verify, &(), &cancel)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_storage_group_put_and_list() {
        let (connector, store) = spawn_node();
        let client = client(connector);
        let cancel = CancellationToken::new();
        let first = put(&client, b"first member", false).await;
        let second = put(&client, b"second member", false).await;
        let members = [first.address.object, second.address.object];

        let id = ObjectId::random();
        let token = client
            .negotiate(SessionRequest::new(Verb::Put, [id]), &cancel)
            .await
            .unwrap();
        let address = client
            .put_storage_group(&token, id, ContainerId::new([7; 32]), &members, &cancel)
            .await
            .unwrap();
        assert_eq!(address.object, id);
        assert!(store.lock().unwrap()[&address].payload.is_empty());

        let header = client.head(&address, true, &cancel).await.unwrap();
        assert!(header.is_storage_group());
        assert_eq!(header.storage_group_members().collect::<Vec<_>>(), members);

        let query = SearchQuery::default().with_flag(object::STORAGE_GROUP_KEY);
        let found = client
            .search(&ContainerId::new([7; 32]), query, &cancel)
            .await
            .unwrap();
        assert_eq!(found, vec![address]);
    }

    #[tokio::test]
    async fn test_storage_group_requires_members() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let id = ObjectId::random();
        let token = crate::transfer::tests::token(Verb::Put, vec![id]);

        let err = client
            .put_storage_group(&token, id, ContainerId::new([7; 32]), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_with_verification() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();

        let report = put(&client, &data, true).await;
        assert_eq!(report.chunks, 6);
        let verification = report.verification.unwrap();
        assert!(verification.valid, "{verification:?}");

        let cancel = CancellationToken::new();
        let token = client
            .negotiate(SessionRequest::new(Verb::Get, [report.address.object]), &cancel)
            .await
            .unwrap();
        let mut sink = Vec::new();
        let outcome = client
            .download(&token, &report.address, &mut sink, &(), &cancel)
            .await
            .unwrap();

        assert_eq!(sink, data);
        assert_eq!(outcome.header.system.owner, client.identity().owner_id());
    }

    #[tokio::test]
    async fn test_put_without_verification() {
        let (connector, _store) = spawn_node();
        let report = put(&client(connector), b"abc", false).await;
        assert!(report.verification.is_none());
    }

    #[tokio::test]
    async fn test_delete_then_get_reports_removed() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let report = put(&client, b"payload", false).await;
        let address = report.address;
        let cancel = CancellationToken::new();

        let token = client
            .negotiate(SessionRequest::new(Verb::Delete, [address.object]), &cancel)
            .await
            .unwrap();
        client.delete(&token, &address, &cancel).await.unwrap();

        let token = client
            .negotiate(SessionRequest::new(Verb::Get, [address.object]), &cancel)
            .await
            .unwrap();
        let mut sink = Vec::new();
        let err = client
            .download(&token, &address, &mut sink, &(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::ObjectRemoved(id)) if id == address.object
        ));
        assert!(sink.is_empty());
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_delete_requires_delete_token() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let cancel = CancellationToken::new();
        let address = Address::new(ContainerId::new([7; 32]), ObjectId::random());
        let token = client
            .negotiate(SessionRequest::new(Verb::Get, [address.object]), &cancel)
            .await
            .unwrap();

        let err = client.delete(&token, &address, &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transfer(TransferError::OutOfScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_head_search_and_ranges() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let data = b"0123456789abcdef";
        let report = put(&client, data, false).await;
        let cancel = CancellationToken::new();

        let header = client.head(&report.address, true, &cancel).await.unwrap();
        assert_eq!(header.system.payload_length, data.len() as u64);

        let found = client
            .search(&ContainerId::new([7; 32]), SearchQuery::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(found, vec![report.address]);

        let ranges = [Range::new(0, 3).unwrap(), Range::new(10, 6).unwrap()];
        let fragments = client
            .get_ranges(&report.address, &ranges, &cancel)
            .await
            .unwrap();
        assert_eq!(fragments, vec![b"012".to_vec(), b"abcdef".to_vec()]);

        let hashes = client
            .range_hashes(None, &report.address, &ranges, &[], &cancel)
            .await
            .unwrap();
        assert_eq!(hashes[1], Hash::sum(b"abcdef"));
    }

    #[tokio::test]
    async fn test_verify_ranges_against_local_file() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let report = put(&client, &data, false).await;
        let cancel = CancellationToken::new();

        let ranges = [Range::new(100, 3000).unwrap(), Range::new(3100, 996).unwrap()];
        let token = client
            .negotiate(
                SessionRequest::new(Verb::RangeHash, [report.address.object])
                    .with_window(ValidityWindow::new(0, 10)),
                &cancel,
            )
            .await
            .unwrap();
        let results = client
            .verify_ranges(
                Some(&token),
                &report.address,
                &ranges,
                &[1, 2, 3, 4, 5],
                &mut Cursor::new(data),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.valid), "{results:?}");
    }

    #[tokio::test]
    async fn test_head_missing_object_maps_to_not_found() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let address = Address::new(ContainerId::new([7; 32]), ObjectId::random());

        let err = client
            .head(&address, false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_connect_canceled() {
        let (connector, _store) = spawn_node();
        let client = client(connector);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .negotiate(SessionRequest::new(Verb::Put, []), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }
}
