//! Byte transports to a language server.
//!
//! Both transports are polled from the UI thread, so [`LangServerIo::read`] must return
//! immediately. Blocking reads happen on helper threads that feed a channel.

use crate::error::Result;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bytes read per `read` call on the helper threads.
pub const CHUNK_SIZE: usize = 64 * 1024;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// Nothing arrived since the last read.
    NoData,
    /// Bytes arrived.
    Data(Vec<u8>),
    /// The server's output stream or socket is closed. No more data will ever arrive.
    Closed,
}

/// A connection to a language server that never blocks on read.
pub trait LangServerIo {
    /// Send bytes to the server.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Take whatever arrived since the last call.
    fn read(&mut self) -> ReadResult;
}

/// Talk to a server over its stdin and stdout.
pub struct SubprocessStdio {
    stdin: Box<dyn Write + Send>,
    received: Receiver<Vec<u8>>,
}

impl SubprocessStdio {
    /// Wrap the server's stdin and stdout (or any writer/reader pair).
    pub fn new<W, R>(stdin: W, stdout: R) -> Self
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || read_to_channel(stdout, tx));
        Self {
            stdin: Box::new(stdin),
            received: rx,
        }
    }
}

impl LangServerIo for SubprocessStdio {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stdin.write_all(bytes)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read(&mut self) -> ReadResult {
        drain_channel(&self.received)
    }
}

/// Talk to a server listening on `localhost:port`.
///
/// Connecting happens on a worker thread that retries until the server accepts. Bytes written
/// before that are queued and sent once connected.
pub struct LocalhostSocketIo {
    send_queue: Sender<Option<Vec<u8>>>,
    received: Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
}

impl LocalhostSocketIo {
    /// Start connecting to `localhost:port`.
    pub fn connect(port: u16) -> Self {
        let (send_tx, send_rx) = mpsc::channel();
        let (data_tx, data_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let worker_stop = Arc::clone(&stop);
        thread::spawn(move || send_queue_to_socket(port, send_rx, data_tx, worker_stop));

        Self {
            send_queue: send_tx,
            received: data_rx,
            stop,
        }
    }
}

impl LangServerIo for LocalhostSocketIo {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        // A stopped worker shows up as `Closed` on the next read.
        if self.send_queue.send(Some(bytes.to_vec())).is_err() {
            debug!("socket worker is gone, dropping {} bytes", bytes.len());
        }
        Ok(())
    }

    fn read(&mut self) -> ReadResult {
        let result = drain_channel(&self.received);
        if result == ReadResult::Closed {
            let _ = self.send_queue.send(None);
        }
        result
    }
}

impl Drop for LocalhostSocketIo {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.send_queue.send(None);
    }
}

fn send_queue_to_socket(
    port: u16,
    send_queue: Receiver<Option<Vec<u8>>>,
    received: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
) {
    let mut stream = loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match TcpStream::connect(("localhost", port)) {
            Ok(stream) => {
                info!(port, "connected to localhost:{port}");
                break stream;
            }
            Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                info!(port, "connecting to localhost:{port} failed, retrying soon");
                thread::sleep(CONNECT_RETRY_INTERVAL);
            }
            Err(err) => {
                error!(port, "connecting to localhost:{port} failed: {err}");
                return;
            }
        }
    };

    match stream.try_clone() {
        Ok(reader) => {
            thread::spawn(move || read_to_channel(reader, received));
        }
        Err(err) => {
            error!(port, "cannot clone langserver socket: {err}");
            return;
        }
    }

    for message in send_queue {
        let Some(bytes) = message else {
            break;
        };
        if let Err(err) = stream.write_all(&bytes) {
            warn!(port, "writing to langserver socket failed: {err}");
            break;
        }
    }

    // Unblocks the reader thread.
    if let Err(err) = stream.shutdown(Shutdown::Both) {
        debug!(port, "socket shutdown failed: {err}");
    }
}

/// Forward everything read from `reader` until EOF or an error. Dropping `tx` marks the end.
fn read_to_channel<R: Read>(mut reader: R, tx: Sender<Vec<u8>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!("langserver read failed: {err}");
                break;
            }
        }
    }
}

fn drain_channel(rx: &Receiver<Vec<u8>>) -> ReadResult {
    let mut data = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) if data.is_empty() => return ReadResult::Closed,
            Err(TryRecvError::Disconnected) => break,
        }
    }

    if data.is_empty() {
        ReadResult::NoData
    } else {
        ReadResult::Data(data)
    }
}

/// Log every line of a server's diagnostic output stream until it closes.
pub fn spawn_stream_logger<R: Read + Send + 'static>(stream: R, pid: u32) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    info!(pid, "langserver logged: {}", text.trim_end_matches(['\r', '\n']));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::time::Instant;

    fn read_until_closed(io: &mut dyn LangServerIo) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while Instant::now() < deadline {
            match io.read() {
                ReadResult::Data(bytes) => out.extend(bytes),
                ReadResult::NoData => thread::sleep(Duration::from_millis(5)),
                ReadResult::Closed => return out,
            }
        }
        panic!("transport never reported Closed");
    }

    #[test]
    fn test_subprocess_stdio_reads_until_closed() {
        let mut io = SubprocessStdio::new(Vec::new(), Cursor::new(b"hello".to_vec()));
        io.write(b"ignored").unwrap();
        assert_eq!(read_until_closed(&mut io), b"hello");
        assert_eq!(io.read(), ReadResult::Closed);
    }

    #[test]
    fn test_socket_queues_writes_until_connected() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut io = LocalhostSocketIo::connect(port);
        io.write(b"ping").unwrap();

        let (mut conn, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        conn.write_all(b"pong").unwrap();
        drop(conn);
        assert_eq!(read_until_closed(&mut io), b"pong");
    }
}
