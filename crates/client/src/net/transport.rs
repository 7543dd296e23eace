use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use bomber::net::{FrameDecoder, encode_frame};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Frame(Vec<u8>),
    Error(String),
    /// Terminal; the link produces nothing after this.
    Closed,
}

/// One live connection to the relay. Never blocks.
pub trait Link {
    fn send(&mut self, payload: &[u8]) -> io::Result<()>;
    fn poll(&mut self) -> Vec<LinkEvent>;
    fn close(&mut self);
}

/// Opens links to a fixed destination; used for the first connection and
/// every reconnect.
pub trait Connector {
    fn target(&self) -> String;
    fn open(&mut self) -> io::Result<Box<dyn Link>>;
}

pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

fn resolve(addr: &str) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} did not resolve to an address", addr),
        )
    })
}

/// Resolves and connects on the calling thread; run from the connect helper.
fn dial(addr: &str, timeout: Duration) -> io::Result<(TcpStream, SocketAddr)> {
    let addr = resolve(addr)?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    Ok((stream, addr))
}

impl Connector for TcpConnector {
    fn target(&self) -> String {
        self.addr.clone()
    }

    /// Returns at once. Resolution and the TCP handshake run on a helper
    /// thread; the link reports `Opened` or `Closed` from `poll` when done.
    fn open(&mut self) -> io::Result<Box<dyn Link>> {
        let (tx, rx) = mpsc::channel();
        let addr = self.addr.clone();
        let timeout = self.timeout;
        thread::Builder::new()
            .name(format!("connect {}", addr))
            .spawn(move || {
                // The link may already be gone; the stream is dropped then.
                let _ = tx.send(dial(&addr, timeout));
            })?;
        Ok(Box::new(TcpLink::pending(self.addr.clone(), rx)))
    }
}

type DialResult = io::Result<(TcpStream, SocketAddr)>;

enum LinkStage {
    Dialing(Receiver<DialResult>),
    Open { stream: TcpStream, addr: SocketAddr },
    Closed,
}

pub struct TcpLink {
    target: String,
    stage: LinkStage,
    decoder: FrameDecoder,
    outbox: Vec<u8>,
}

impl TcpLink {
    fn pending(target: String, dial: Receiver<DialResult>) -> Self {
        Self {
            target,
            stage: LinkStage::Dialing(dial),
            decoder: FrameDecoder::new(),
            outbox: Vec::new(),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let LinkStage::Open { stream, .. } = &mut self.stage else {
            return Ok(());
        };
        while !self.outbox.is_empty() {
            match stream.write(&self.outbox) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Moves a finished dial into the open stage. Returns the events it
    /// produced, or `None` while the handshake is still running.
    fn finish_dial(&mut self) -> Option<Vec<LinkEvent>> {
        let LinkStage::Dialing(dial) = &self.stage else {
            return Some(Vec::new());
        };
        let result = match dial.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(io::Error::other("connect thread exited")),
        };

        match result {
            Ok((stream, addr)) => {
                self.stage = LinkStage::Open { stream, addr };
                Some(vec![LinkEvent::Opened])
            }
            Err(e) => {
                self.stage = LinkStage::Closed;
                Some(vec![
                    LinkEvent::Error(format!("connect to {} failed: {}", self.target, e)),
                    LinkEvent::Closed,
                ])
            }
        }
    }
}

impl Link for TcpLink {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        if matches!(self.stage, LinkStage::Closed) {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let frame = encode_frame(payload)?;
        self.outbox.extend_from_slice(&frame);
        self.flush()
    }

    fn poll(&mut self) -> Vec<LinkEvent> {
        let Some(mut events) = self.finish_dial() else {
            return Vec::new();
        };
        let LinkStage::Open { addr, .. } = &self.stage else {
            return events;
        };
        let addr = *addr;

        if let Err(e) = self.flush() {
            events.push(LinkEvent::Error(format!("write to {} failed: {}", addr, e)));
            self.close();
            events.push(LinkEvent::Closed);
            return events;
        }

        let mut eof = false;
        if let LinkStage::Open { stream, .. } = &mut self.stage {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(n) => self.decoder.push(&chunk[..n]),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        events.push(LinkEvent::Error(format!("read from {} failed: {}", addr, e)));
                        eof = true;
                        break;
                    }
                }
            }
        }

        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => events.push(LinkEvent::Frame(frame)),
                Ok(None) => break,
                Err(e) => {
                    events.push(LinkEvent::Error(e.to_string()));
                    eof = true;
                    break;
                }
            }
        }

        if eof {
            self.close();
            events.push(LinkEvent::Closed);
        }
        events
    }

    fn close(&mut self) {
        let _ = self.flush();
        if let LinkStage::Open { stream, .. } = &self.stage {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.stage = LinkStage::Closed;
    }
}
