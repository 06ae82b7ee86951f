//! UDP socket node.

use async_trait::async_trait;
use bytes::BytesMut;
use gridlink_core::node::RawFd;
use gridlink_core::{Node, NodeDirection, NodeError, Sample, SampleMut};
use parking_lot::RwLock;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::format::{Codec, Format};
use crate::registry::{BuildError, NodeConfig};

/// Largest datagram we receive.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Largest UDP payload over IPv4.
const MAX_PAYLOAD: usize = 65_507;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    /// Address to bind to.
    local: SocketAddr,
    /// Peer to send to. Required for writing.
    #[serde(default)]
    remote: Option<SocketAddr>,
    #[serde(default)]
    format: Format,
    /// Source id placed into binary message headers.
    #[serde(default)]
    source_id: u8,
}

struct Receiver {
    codec: Codec,
    buf: Vec<u8>,
}

struct Sender {
    codec: Codec,
    buf: BytesMut,
}

/// Exchanges samples with a peer over UDP.
pub struct SocketNode {
    name: String,
    input: NodeDirection,
    output: NodeDirection,
    local: SocketAddr,
    remote: Option<SocketAddr>,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    receiver: Mutex<Receiver>,
    sender: Mutex<Sender>,
    closed: Notify,
}

impl SocketNode {
    /// Create from configuration. The socket is bound on [`Node::start`].
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for invalid parameters, or if writing is
    /// enabled without a remote address.
    pub fn from_config(config: &NodeConfig) -> Result<Self, BuildError> {
        let params: Params = config.params()?;

        let mut output = config.output.clone();
        if params.remote.is_none() {
            if config.params.contains_key("remote") || !config.output.hooks.is_empty() {
                return Err(config.invalid("writing requires a remote address"));
            }
            output.enabled = false;
        }

        Ok(Self {
            name: config.name.clone(),
            input: config.input.clone(),
            output,
            local: params.local,
            remote: params.remote,
            socket: RwLock::new(None),
            receiver: Mutex::new(Receiver {
                codec: Codec::new(params.format, params.source_id),
                buf: vec![0; MAX_DATAGRAM],
            }),
            sender: Mutex::new(Sender {
                codec: Codec::new(params.format, params.source_id),
                buf: BytesMut::with_capacity(MAX_DATAGRAM),
            }),
            closed: Notify::new(),
        })
    }

    /// Bound address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.read().as_ref().and_then(|s| s.local_addr().ok())
    }

    fn socket(&self) -> Result<Arc<UdpSocket>, NodeError> {
        self.socket.read().clone().ok_or(NodeError::Closed)
    }
}

#[async_trait]
impl Node for SocketNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "socket"
    }

    fn input(&self) -> &NodeDirection {
        &self.input
    }

    fn output(&self) -> &NodeDirection {
        &self.output
    }

    async fn start(&self) -> Result<(), NodeError> {
        let socket = UdpSocket::bind(self.local).await?;
        info!(
            node = %self.name,
            local = %socket.local_addr()?,
            remote = ?self.remote,
            "Socket bound"
        );
        *self.socket.write() = Some(Arc::new(socket));
        Ok(())
    }

    async fn stop(&self) -> Result<(), NodeError> {
        self.socket.write().take();
        self.closed.notify_waiters();
        debug!(node = %self.name, "Socket closed");
        Ok(())
    }

    async fn read(&self, smps: &mut [SampleMut]) -> Result<usize, NodeError> {
        let socket = self.socket()?;
        let mut receiver = self.receiver.lock().await;
        let Receiver { codec, buf } = &mut *receiver;

        let (len, peer) = tokio::select! {
            _ = self.closed.notified() => return Err(NodeError::Closed),
            received = socket.recv_from(buf) => received?,
        };

        match codec.decode(&buf[..len], Some(&self.input.signals).filter(|s| !s.is_empty()), smps) {
            Ok(n) => Ok(n),
            Err(err) => {
                warn!(node = %self.name, %peer, error = %err, "Dropped malformed datagram");
                Err(err)
            }
        }
    }

    /// Send `smps` in as many datagrams as needed.
    ///
    /// A sample too large for any datagram is discarded and counted as
    /// written, so it cannot block the samples behind it.
    async fn write(&self, smps: &[Sample]) -> Result<usize, NodeError> {
        let Some(remote) = self.remote else {
            return Err(NodeError::Other(format!("node '{}' has no remote address", self.name)));
        };
        let socket = self.socket()?;
        let mut sender = self.sender.lock().await;
        let Sender { codec, buf } = &mut *sender;

        let mut sent = 0;
        while sent < smps.len() {
            match codec.encode(&smps[sent..], buf, MAX_PAYLOAD) {
                Ok(n) => {
                    if let Err(err) = socket.send_to(buf, remote).await {
                        if sent == 0 {
                            return Err(err.into());
                        }
                        debug!(node = %self.name, error = %err, sent, "Send failed after partial write");
                        break;
                    }
                    sent += n;
                }
                Err(err) => {
                    warn!(
                        node = %self.name,
                        sequence = smps[sent].sequence,
                        error = %err,
                        "Discarding sample that does not fit a datagram"
                    );
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }

    #[cfg(unix)]
    fn poll_fds(&self) -> Vec<RawFd> {
        use std::os::fd::AsRawFd;
        self.socket
            .read()
            .as_ref()
            .map(|s| vec![s.as_raw_fd()])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::{SampleFlags, SamplePool, SignalData, SignalList};

    fn socket_node(name: &str, format: &str, remote: Option<SocketAddr>) -> SocketNode {
        let mut config = NodeConfig::new(name, "socket")
            .with_param("local", "127.0.0.1:0")
            .with_param("format", format);
        if let Some(remote) = remote {
            config = config.with_param("remote", remote.to_string());
        }
        config.input = NodeDirection::with_signals(SignalList::generic(2));
        SocketNode::from_config(&config).unwrap()
    }

    async fn exchange(format: &str) {
        let rx = socket_node("rx", format, None);
        rx.start().await.unwrap();
        let tx = socket_node("tx", format, rx.local_addr());
        tx.start().await.unwrap();
        assert_eq!(rx.poll_fds().len(), 1);

        let pool = SamplePool::new(8, 2);
        let out: Vec<Sample> = (0..3)
            .map(|seq| {
                let mut smp = pool.allocate().unwrap();
                smp.sequence = seq;
                smp.flags = SampleFlags::HAS_SEQUENCE;
                smp.set_values(&[SignalData::Float(seq as f64), SignalData::Float(0.5)]);
                smp.freeze()
            })
            .collect();
        assert_eq!(tx.write(&out).await.unwrap(), 3);

        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 4);
        assert_eq!(rx.read(&mut slots).await.unwrap(), 3);
        assert_eq!(slots[2].sequence, 2);
        assert_eq!(
            slots[2].values(),
            &[SignalData::Float(2.0), SignalData::Float(0.5)]
        );
        assert!(slots[0].flags.contains(SampleFlags::HAS_TS_RECEIVED));
    }

    #[tokio::test]
    async fn test_binary_exchange() {
        exchange("binary").await;
    }

    #[tokio::test]
    async fn test_msgpack_exchange() {
        exchange("msgpack").await;
    }

    #[tokio::test]
    async fn test_stop_wakes_reader() {
        let rx = Arc::new(socket_node("rx", "binary", None));
        rx.start().await.unwrap();

        let reader = {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                let pool = SamplePool::new(1, 2);
                let mut slots = Vec::new();
                pool.allocate_into(&mut slots, 1);
                rx.read(&mut slots).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        rx.stop().await.unwrap();

        assert!(matches!(reader.await.unwrap(), Err(NodeError::Closed)));
    }

    #[test]
    fn test_write_disabled_without_remote() {
        let node = socket_node("rx", "binary", None);
        assert!(!node.output().enabled);
        assert!(node.input().enabled);
    }

    #[tokio::test]
    async fn test_large_batch_is_split() {
        let rx = socket_node("rx", "binary", None);
        rx.start().await.unwrap();
        let tx = socket_node("tx", "binary", rx.local_addr());
        tx.start().await.unwrap();

        // Two of these exceed one datagram, the third never fits
        let pool = SamplePool::new(8, 20_000);
        let out: Vec<Sample> = [10_000, 10_000, 20_000, 2]
            .into_iter()
            .enumerate()
            .map(|(seq, len)| {
                let mut smp = pool.allocate().unwrap();
                smp.sequence = seq as u64;
                smp.flags = SampleFlags::HAS_SEQUENCE;
                smp.resize(len, SignalData::Float(0.25));
                smp.freeze()
            })
            .collect();
        assert_eq!(tx.write(&out).await.unwrap(), 4);

        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 4);
        let mut received = Vec::new();
        while received.len() < 3 {
            let n = rx.read(&mut slots).await.unwrap();
            assert_eq!(n, 1);
            received.push((slots[0].sequence, slots[0].len()));
        }
        assert_eq!(received, vec![(0, 2), (1, 2), (3, 2)]);
    }
}
