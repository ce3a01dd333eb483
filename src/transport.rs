//! HTTP response abstraction used by the handlers.
//!
//! A `Transport` is one response on one connection. Headers are staged until
//! the first send; after that the response is committed and the only way to
//! report a failure is to stop writing and drop the connection.

use std::io::Write;

use crate::error::TransportError;

pub trait Transport {
    fn set_response_type(&mut self, mime: &str);

    fn set_header(&mut self, name: &str, value: &str);

    /// Send a body of known length in one piece, without chunk framing.
    fn send_exact(&mut self, body: &[u8]) -> Result<(), TransportError>;

    /// Send one piece of a chunked body. An empty slice sends nothing; use
    /// `send_chunk_end` to terminate the body.
    fn send_chunk(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Send the terminal zero-length chunk.
    fn send_chunk_end(&mut self) -> Result<(), TransportError>;

    /// Respond with an error status. Only possible before anything was sent.
    fn send_error(&mut self, status: u16) -> Result<(), TransportError>;

    /// True once any byte of the response reached the connection.
    fn is_committed(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResponseState {
    Pending,
    Chunked,
    Finished,
}

/// HTTP/1.1 response writer over any byte stream.
pub struct HttpTransport<W: Write> {
    stream: W,
    content_type: String,
    headers: Vec<(String, String)>,
    state: ResponseState,
    bytes_sent: u64,
}

impl<W: Write> HttpTransport<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            content_type: "text/html".to_string(),
            headers: Vec::new(),
            state: ResponseState::Pending,
            bytes_sent: 0,
        }
    }

    /// Body and framing bytes written so far, excluding the header block.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn into_inner(self) -> W {
        self.stream
    }

    fn head(&self, status: u16, framing: &str) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\n",
            status,
            reason_phrase(status),
            self.content_type
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(framing);
        head.push_str("Connection: close\r\n\r\n");
        head
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn start_chunked(&mut self) -> Result<(), TransportError> {
        match self.state {
            ResponseState::Pending => {
                let head = self.head(200, "Transfer-Encoding: chunked\r\n");
                // Committed even if the write fails part-way.
                self.state = ResponseState::Chunked;
                self.write(head.as_bytes())
            }
            ResponseState::Chunked => Ok(()),
            ResponseState::Finished => Err(TransportError::Closed),
        }
    }
}

impl<W: Write> Transport for HttpTransport<W> {
    fn set_response_type(&mut self, mime: &str) {
        self.content_type = mime.to_string();
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send_exact(&mut self, body: &[u8]) -> Result<(), TransportError> {
        match self.state {
            ResponseState::Pending => {}
            ResponseState::Chunked => return Err(TransportError::Committed),
            ResponseState::Finished => return Err(TransportError::Closed),
        }
        let head = self.head(200, &format!("Content-Length: {}\r\n", body.len()));
        self.state = ResponseState::Finished;
        self.write(head.as_bytes())?;
        self.write(body)?;
        self.stream.flush()?;
        self.bytes_sent += body.len() as u64;
        Ok(())
    }

    fn send_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.start_chunked()?;
        if data.is_empty() {
            return Ok(());
        }
        let size_line = format!("{:X}\r\n", data.len());
        self.write(size_line.as_bytes())?;
        self.write(data)?;
        self.write(b"\r\n")?;
        self.stream.flush()?;
        self.bytes_sent += (size_line.len() + data.len() + 2) as u64;
        Ok(())
    }

    fn send_chunk_end(&mut self) -> Result<(), TransportError> {
        self.start_chunked()?;
        self.state = ResponseState::Finished;
        self.write(b"0\r\n\r\n")?;
        self.stream.flush()?;
        self.bytes_sent += 5;
        Ok(())
    }

    fn send_error(&mut self, status: u16) -> Result<(), TransportError> {
        match self.state {
            ResponseState::Pending => {}
            ResponseState::Chunked => return Err(TransportError::Committed),
            ResponseState::Finished => return Err(TransportError::Closed),
        }
        let body = format!("{} {}", status, reason_phrase(status));
        self.content_type = "text/plain".to_string();
        self.headers.clear();
        let head = self.head(status, &format!("Content-Length: {}\r\n", body.len()));
        self.state = ResponseState::Finished;
        self.write(head.as_bytes())?;
        self.write(body.as_bytes())?;
        self.stream.flush()?;
        self.bytes_sent += body.len() as u64;
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.state != ResponseState::Pending
    }
}

pub(crate) fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}
