use std::{net, sync::mpsc as std_mpsc, thread, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    runtime,
    sync::oneshot,
};

pub struct Server {
    addr: net::SocketAddr,
    panic_rx: std_mpsc::Receiver<()>,
    events_rx: std_mpsc::Receiver<Event>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    Accepted,
    ConnectionClosed,
}

impl Server {
    pub fn addr(&self) -> net::SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    #[allow(unused)]
    pub fn events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if !::std::thread::panicking() {
            self.panic_rx
                .recv_timeout(Duration::from_secs(3))
                .expect("test server should not panic");
        }
    }
}

/// Accepts connections on 127.0.0.1 and echoes back whatever it reads.
pub fn echo() -> Server {
    // Spawn new runtime in thread to prevent reactor execution context conflict
    let test_name = thread::current().name().unwrap_or("<unknown>").to_string();
    thread::spawn(move || {
        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("new rt");
        let listener = rt.block_on(async move {
            tokio::net::TcpListener::bind(&std::net::SocketAddr::from(([127, 0, 0, 1], 0)))
                .await
                .unwrap()
        });
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let (panic_tx, panic_rx) = std_mpsc::channel();
        let (events_tx, events_rx) = std_mpsc::channel();
        let tname = format!("test({test_name})-support-server");
        thread::Builder::new()
            .name(tname)
            .spawn(move || {
                rt.block_on(async move {
                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => {
                                break;
                            }
                            accepted = listener.accept() => {
                                let (io, _) = accepted.expect("accepted");
                                let _ = events_tx.send(Event::Accepted);
                                let events_tx = events_tx.clone();
                                tokio::spawn(async move {
                                    echo_client(io).await;
                                    let _ = events_tx.send(Event::ConnectionClosed);
                                });
                            }
                        }
                    }
                    let _ = panic_tx.send(());
                });
            })
            .expect("thread spawn");
        Server {
            addr,
            panic_rx,
            events_rx,
            shutdown_tx: Some(shutdown_tx),
        }
    })
    .join()
    .unwrap()
}

async fn echo_client(mut client_socket: TcpStream) {
    let mut buf = [0; 1024];
    loop {
        let n = match client_socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if client_socket.write_all(&buf[..n]).await.is_err() {
            break;
        }
    }
}

/// Returns a loopback address nothing is listening on.
#[allow(unused)]
pub fn closed_addr() -> net::SocketAddr {
    let listener = net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    listener.local_addr().expect("local_addr")
}

/// A listener that never accepts, with its accept queue already full.
///
/// Further SYNs to `addr` go unanswered, so a connect to it stays in the
/// handshake until the caller gives up.
#[allow(unused)]
pub struct Saturated {
    addr: net::SocketAddr,
    _listener: tokio::net::TcpListener,
    _backlog: Vec<TcpStream>,
}

#[allow(unused)]
impl Saturated {
    pub fn addr(&self) -> net::SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Binds a listener with a backlog of one and connects to it until a
/// handshake stops completing.
#[allow(unused)]
pub async fn saturated() -> Saturated {
    let socket = tokio::net::TcpSocket::new_v4().expect("socket");
    socket
        .bind(net::SocketAddr::from(([127, 0, 0, 1], 0)))
        .expect("bind");
    let listener = socket.listen(1).expect("listen");
    let addr = listener.local_addr().expect("local_addr");

    let mut backlog = Vec::new();
    for _ in 0..64 {
        match tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => backlog.push(stream),
            Ok(Err(e)) => panic!("filling backlog of {addr}: {e}"),
            Err(_elapsed) => {
                return Saturated {
                    addr,
                    _listener: listener,
                    _backlog: backlog,
                }
            }
        }
    }
    panic!("accept queue of {addr} never filled");
}
