use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flume::Sender;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use convene_api::NodeAddress;

use super::{Inbound, Transport, TransportError};
use crate::wire::{encode_frame, read_frame, Frame};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

type Connection = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Length-prefixed JSON frames over TCP.
///
/// Outbound traffic to a peer reuses one cached connection, so frames to that
/// peer keep their order. Inbound connections are read-only.
#[derive(Debug)]
pub struct TcpTransport {
    address: NodeAddress,
    connections: Mutex<HashMap<NodeAddress, Connection>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Listens on `address`. Port 0 picks a free port; the chosen port becomes
    /// part of [`Transport::local_address`].
    pub async fn bind(address: &NodeAddress) -> Result<(Arc<Self>, Inbound), TransportError> {
        let listener = TcpListener::bind(address.as_str()).await?;
        let port = listener.local_addr()?.port();
        let local = NodeAddress::from_parts(address.host(), port);
        let (sender, receiver) = flume::unbounded();

        let accept_task = tokio::spawn(accept_loop(listener, sender, local.clone()));
        let transport = TcpTransport {
            address: local,
            connections: Mutex::new(HashMap::new()),
            accept_task: Mutex::new(Some(accept_task)),
        };
        Ok((Arc::new(transport), receiver))
    }

    async fn connection(&self, to: &NodeAddress) -> Result<Connection, TransportError> {
        if let Some(conn) = self.connections.lock().get(to) {
            return Ok(conn.clone());
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(to.as_str()))
            .await
            .map_err(|_| TransportError::Unreachable(to.clone()))?
            .map_err(|err| {
                debug!(%to, error = %err, "connect failed");
                TransportError::Unreachable(to.clone())
            })?;
        stream.set_nodelay(true)?;
        let (_read, write) = stream.into_split();
        let conn = Arc::new(tokio::sync::Mutex::new(write));

        // A concurrent connect may have won; keep the first one.
        let mut connections = self.connections.lock();
        Ok(connections.entry(to.clone()).or_insert(conn).clone())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_address(&self) -> NodeAddress {
        self.address.clone()
    }

    async fn transmit(&self, to: &NodeAddress, frame: Frame) -> Result<(), TransportError> {
        if self.accept_task.lock().is_none() {
            return Err(TransportError::Closed);
        }
        let bytes = encode_frame(&frame)?;
        let conn = self.connection(to).await?;

        let result = {
            let mut writer = conn.lock().await;
            writer.write_all(&bytes).await
        };
        if let Err(err) = result {
            self.connections.lock().remove(to);
            debug!(%to, error = %err, "write failed, dropping connection");
            return Err(TransportError::Unreachable(to.clone()));
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        let connections: Vec<Connection> = self.connections.lock().drain().map(|(_, c)| c).collect();
        for conn in connections {
            let _ = conn.lock().await.shutdown().await;
        }
    }
}

async fn accept_loop(listener: TcpListener, inbound: Sender<Frame>, local: NodeAddress) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%local, %peer, "accepted connection");
                tokio::spawn(read_loop(stream, inbound.clone()));
            }
            Err(err) => {
                warn!(%local, error = %err, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn read_loop(stream: TcpStream, inbound: Sender<Frame>) {
    let (mut reader, _write) = stream.into_split();
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if inbound.send_async(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "dropping connection after bad frame");
                break;
            }
        }
    }
}
