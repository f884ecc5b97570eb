//! In-process node stand-in for exercising a [`Peer`](super::Peer) over
//! loopback TCP.

use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::fmt::MakeWriter;
use tokio::net::{TcpListener, TcpStream};

use crate::codec::FrameBuffer;
use crate::config::Config;
use crate::crypto::{encrypt_nonce, public_from_bytes, shared_secret, Nonce, H256};
use crate::identity::Identity;
use crate::protocol::{BlockSyncMessage, Envelope, ExtensionMessage, SignedEnvelope};

pub(crate) const GENESIS: H256 = H256::new([0x11; 32]);

/// Listening side of a fake node.
pub(crate) struct FakeNode {
    listener: TcpListener,
    identity: Identity,
}

impl FakeNode {
    pub(crate) async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            identity: Identity::generate(),
        }
    }

    /// A peer configuration pointing at this node.
    pub(crate) fn config(&self) -> Config {
        let mut config = Config::new();
        config.node.port = Some(self.listener.local_addr().unwrap().port());
        config.byzantine.request_delay_ms = Some(10);
        config
    }

    /// Accept one connection and read its Sync1.
    pub(crate) async fn accept(&self) -> NodeConnection {
        let (stream, _) = self.listener.accept().await.unwrap();
        let mut conn = NodeConnection {
            stream,
            frames: FrameBuffer::new(),
            identity: self.identity.clone(),
            nonce: Nonce::new(0),
            peer_secret: [0u8; 32],
        };
        let record = conn.read_record().await;
        match Envelope::decode(&record).unwrap() {
            Envelope::Sync1 { public_key, .. } => {
                let remote = public_from_bytes(&public_key).unwrap();
                conn.peer_secret = shared_secret(conn.identity.secret_key(), &remote);
            }
            other => panic!("expected Sync1, got {:?}", other),
        }
        conn
    }

    /// Accept, complete the handshake and answer every negotiation.
    pub(crate) async fn accept_established(&self, extensions: usize) -> NodeConnection {
        let mut conn = self.accept().await;
        conn.send_ack(Nonce::new(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10))
            .await;
        for _ in 0..extensions {
            match conn.read_signed().await {
                Envelope::NegotiationRequest { extension, version } => {
                    conn.send_signed(Envelope::NegotiationResponse { extension, version })
                        .await;
                }
                other => panic!("expected NegotiationRequest, got {:?}", other),
            }
        }
        conn
    }
}

/// Node side of one accepted connection.
pub(crate) struct NodeConnection {
    stream: TcpStream,
    frames: FrameBuffer,
    identity: Identity,
    pub(crate) nonce: Nonce,
    peer_secret: [u8; 32],
}

impl NodeConnection {
    pub(crate) async fn read_record(&mut self) -> Vec<u8> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(record) = self.frames.next_record().unwrap() {
                return record;
            }
            let len = self.stream.read(&mut buf).await.unwrap();
            assert!(len > 0, "peer closed the connection");
            self.frames.extend(&buf[..len]);
        }
    }

    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub(crate) async fn send_ack(&mut self, nonce: Nonce) {
        self.nonce = nonce;
        let ack = Envelope::Ack {
            public_key: self.identity.public_bytes(),
            encrypted_nonce: encrypt_nonce(&self.peer_secret, nonce),
        };
        self.write_raw(&ack.encode()).await;
    }

    pub(crate) async fn read_signed(&mut self) -> Envelope {
        let record = self.read_record().await;
        SignedEnvelope::open(&record, &self.nonce).unwrap()
    }

    /// Read the next extension message sent by the peer.
    pub(crate) async fn read_message(&mut self) -> ExtensionMessage {
        match self.read_signed().await {
            Envelope::Unencrypted { extension, data } => {
                ExtensionMessage::decode(&extension, &data).unwrap()
            }
            other => panic!("expected Unencrypted, got {:?}", other),
        }
    }

    pub(crate) async fn send_signed(&mut self, envelope: Envelope) {
        let record = SignedEnvelope::seal(envelope, &self.nonce).unwrap().encode();
        self.write_raw(&record).await;
    }

    pub(crate) async fn send_message(&mut self, message: impl Into<ExtensionMessage>) {
        let message = message.into();
        self.send_signed(Envelope::Unencrypted {
            extension: message.extension().to_string(),
            data: message.encode().unwrap(),
        })
        .await;
    }

    pub(crate) async fn send_status(&mut self) {
        self.send_message(BlockSyncMessage::Status {
            total_score: 500,
            best_hash: H256::new([0x22; 32]),
            genesis_hash: GENESIS,
        })
        .await;
    }
}

/// Log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Install as the thread's default subscriber at INFO and above.
    pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
