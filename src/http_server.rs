//! HTTP server module
//!
//! Serves the control page and accepts color commands. Each worker owns one
//! TCP socket and handles one connection at a time; several workers can run
//! against the same port.

use crate::color_command::{self, ColorAck, ColorCommand};
use crate::led_control::StripDriver;
use crate::led_state::LedCoordinator;
use crate::page::INDEX_HTML;
use crate::{BoardError, config};
use core::fmt::Write as _;
use core::ops::Range;
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write as _;
use esp_println::println;
use heapless::String;

/// Largest request (head plus body) a worker buffers
pub const MAX_REQUEST_SIZE: usize = 1024;

/// Request methods the router distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// Parsed request line and the headers we care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub path: String<64>,
    /// Offset of the first body byte in the receive buffer
    pub body_start: usize,
    pub content_length: usize,
}

/// Where a request ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    SetColor,
    MethodNotAllowed,
    NotFound,
}

/// Map method and path to a handler
pub fn route(method: Method, path: &str) -> Route {
    let path = path.split('?').next().unwrap_or(path);
    match (path, method) {
        ("/", Method::Get) => Route::Index,
        ("/set_color", Method::Post) => Route::SetColor,
        ("/", _) | ("/set_color", _) => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// Parse the request head once it has fully arrived
///
/// Returns `Ok(None)` while the blank line ending the headers is still missing.
pub fn parse_head(data: &[u8]) -> Result<Option<RequestHead>, BoardError> {
    let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };

    let head = core::str::from_utf8(&data[..header_end]).map_err(|_| BoardError::ProtocolError)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = match parts.next() {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        Some(_) => Method::Other,
        None => return Err(BoardError::ProtocolError),
    };
    let raw_path = parts.next().ok_or(BoardError::ProtocolError)?;
    if !raw_path.starts_with('/') {
        return Err(BoardError::ProtocolError);
    }
    let mut path = String::new();
    path.push_str(raw_path)
        .map_err(|_| BoardError::ProtocolError)?;

    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| BoardError::ProtocolError)?;
            }
        }
    }

    Ok(Some(RequestHead {
        method,
        path,
        body_start: header_end + 4,
        content_length,
    }))
}

/// Status line and headers for a response without keep-alive
pub fn response_head(
    status: &str,
    content_type: &str,
    content_length: usize,
) -> Result<String<192>, BoardError> {
    let mut head = String::new();
    write!(
        head,
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status, content_type, content_length
    )
    .map_err(|_| BoardError::HttpError)?;
    Ok(head)
}

/// End of the `/set_color` body inside a receive buffer of `buffer_len` bytes
pub fn form_body_end(head: &RequestHead, buffer_len: usize) -> usize {
    (head.body_start + head.content_length.min(config::MAX_FORM_BODY)).min(buffer_len)
}

/// Body bytes to parse, given how far the buffer was filled
///
/// `received` is the end of the received data or the read error. `None`
/// means there is nothing to parse: the body was empty or could not be read.
pub fn form_body(
    head: &RequestHead,
    buffer_len: usize,
    received: Result<usize, BoardError>,
) -> Option<Range<usize>> {
    let end = received.ok()?.min(form_body_end(head, buffer_len));
    (end > head.body_start).then_some(head.body_start..end)
}

/// Apply a `/set_color` body that has been read into `buffer`
///
/// Returns `Ok(None)` without touching the LEDs when no body arrived; the
/// caller answers that with a 500. Errors come from the strip driver.
pub async fn apply_color_form<S>(
    coordinator: &LedCoordinator<S>,
    head: &RequestHead,
    buffer: &[u8],
    received: Result<usize, BoardError>,
) -> Result<Option<ColorAck>, BoardError>
where
    S: StripDriver,
{
    let Some(body) = form_body(head, buffer.len(), received) else {
        return Ok(None);
    };
    let command = ColorCommand::from_form(&buffer[body]);
    color_command::handle(coordinator, command).await.map(Some)
}

/// HTTP server for the control page and color commands
pub struct HttpServer<'a> {
    port: u16,
    stack: &'a Stack<'a>,
}

impl<'a> HttpServer<'a> {
    /// Create a new HTTP server instance on the configured port
    pub fn new(stack: &'a Stack<'a>) -> Self {
        Self {
            port: config::HTTP_PORT,
            stack,
        }
    }

    /// Accept and serve connections forever
    pub async fn serve<S>(&self, coordinator: &LedCoordinator<S>, worker_id: usize) -> !
    where
        S: StripDriver,
    {
        let mut rx_buffer = [0u8; 1536];
        let mut tx_buffer = [0u8; 2048];

        println!("[HTTP] Worker {} starting on port {}", worker_id, self.port);

        loop {
            // Sockets cannot accept before the interface has an address
            self.stack.wait_config_up().await;

            let mut socket = TcpSocket::new(*self.stack, &mut rx_buffer, &mut tx_buffer);
            socket.set_timeout(Some(Duration::from_secs(10)));

            if let Err(e) = socket.accept(self.port).await {
                println!("[HTTP] Worker {} accept error: {:?}", worker_id, e);
                Timer::after(Duration::from_millis(200)).await;
                continue;
            }

            if let Err(e) = Self::handle_connection(&mut socket, coordinator).await {
                println!("[HTTP] Worker {} connection error: {:?}", worker_id, e);
            }

            let _ = socket.flush().await;
            socket.close();
        }
    }

    async fn handle_connection<S>(
        socket: &mut TcpSocket<'_>,
        coordinator: &LedCoordinator<S>,
    ) -> Result<(), BoardError>
    where
        S: StripDriver,
    {
        let mut buffer = [0u8; MAX_REQUEST_SIZE];
        let mut total = 0usize;

        let head = loop {
            let n = socket
                .read(&mut buffer[total..])
                .await
                .map_err(|_| BoardError::HttpError)?;
            if n == 0 {
                if total == 0 {
                    return Ok(());
                }
                break None;
            }
            total += n;

            match parse_head(&buffer[..total]) {
                Ok(Some(head)) => break Some(head),
                Ok(None) if total < buffer.len() => continue,
                Ok(None) | Err(_) => break None,
            }
        };

        let Some(head) = head else {
            return Self::respond(socket, "400 Bad Request", "text/plain", b"Bad Request").await;
        };

        match route(head.method, &head.path) {
            Route::Index => {
                Self::respond(socket, "200 OK", "text/html", INDEX_HTML.as_bytes()).await
            }
            Route::SetColor => {
                let body_end = form_body_end(&head, buffer.len());
                let received = Self::read_body(socket, &mut buffer, total, body_end).await;

                match apply_color_form(coordinator, &head, &buffer, received).await {
                    Ok(Some(_)) => {
                        Self::respond(socket, "200 OK", "text/plain", ColorAck::MESSAGE.as_bytes())
                            .await
                    }
                    Ok(None) => {
                        println!("[HTTP] Color command body could not be received");
                        Self::respond(
                            socket,
                            "500 Internal Server Error",
                            "text/plain",
                            b"Internal Server Error",
                        )
                        .await
                    }
                    Err(e) => crate::fatal("strip refresh failed", e),
                }
            }
            Route::MethodNotAllowed => {
                Self::respond(socket, "405 Method Not Allowed", "text/plain", b"Method Not Allowed")
                    .await
            }
            Route::NotFound => {
                Self::respond(socket, "404 Not Found", "text/plain", b"Not Found").await
            }
        }
    }

    /// Keep reading until `body_end` or until the peer stops sending
    ///
    /// Returns the end of the received data.
    async fn read_body(
        socket: &mut TcpSocket<'_>,
        buffer: &mut [u8],
        mut total: usize,
        body_end: usize,
    ) -> Result<usize, BoardError> {
        while total < body_end {
            match socket.read(&mut buffer[total..body_end]).await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => {
                    println!("[HTTP] Body read error: {:?}", e);
                    return Err(BoardError::HttpError);
                }
            }
        }
        Ok(total.min(body_end))
    }

    async fn respond(
        socket: &mut TcpSocket<'_>,
        status: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), BoardError> {
        let head = response_head(status, content_type, body.len())?;
        socket
            .write_all(head.as_bytes())
            .await
            .map_err(|_| BoardError::HttpError)?;
        socket
            .write_all(body)
            .await
            .map_err(|_| BoardError::HttpError)?;
        println!("[HTTP] {} ({} bytes)", status, body.len());
        Ok(())
    }
}
