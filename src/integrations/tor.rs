//! Tor control-port client for requesting a fresh circuit
//!
//! Used when the chat transport drops, so the reconnect goes out over a new
//! exit node.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::{Error, Result};

/// Default control port address
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:9051";

/// Requests new Tor circuits via `SIGNAL NEWNYM`
#[derive(Debug, Clone)]
pub struct CircuitRenewer {
    control_addr: String,
    password: Option<SecretString>,
    timeout: Duration,
}

impl CircuitRenewer {
    /// Create a renewer for a control port
    #[must_use]
    pub fn new(control_addr: impl Into<String>, password: Option<SecretString>) -> Self {
        Self {
            control_addr: control_addr.into(),
            password,
            timeout: Duration::from_secs(10),
        }
    }

    /// Ask Tor for a new circuit
    ///
    /// # Errors
    ///
    /// Returns error if the control port is unreachable or rejects a command
    pub async fn renew(&self) -> Result<()> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.control_addr).await?;
            let password = self.password.as_ref().map(|p| p.expose_secret());
            stream.write_all(build_commands(password).as_bytes()).await?;
            stream.flush().await?;

            let mut reply = String::new();
            stream.read_to_string(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Circuit(format!("control port {} timed out", self.control_addr)))?
            .map_err(|e| Error::Circuit(format!("control port {}: {e}", self.control_addr)))?;

        check_reply(&reply)?;
        tracing::info!(addr = %self.control_addr, "requested new Tor circuit");
        Ok(())
    }
}

/// Control commands: authenticate, request a new identity, quit
fn build_commands(password: Option<&str>) -> String {
    let password = password.unwrap_or_default().replace('\\', "\\\\").replace('"', "\\\"");
    format!("AUTHENTICATE \"{password}\"\r\nSIGNAL NEWNYM\r\nQUIT\r\n")
}

/// Every reply line must carry a 2xx status
fn check_reply(reply: &str) -> Result<()> {
    let mut seen = false;
    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        seen = true;
        if !line.starts_with('2') {
            return Err(Error::Circuit(format!("control port rejected command: {line}")));
        }
    }

    if seen {
        Ok(())
    } else {
        Err(Error::Circuit("empty control port reply".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_without_password() {
        assert_eq!(
            build_commands(None),
            "AUTHENTICATE \"\"\r\nSIGNAL NEWNYM\r\nQUIT\r\n"
        );
    }

    #[test]
    fn test_commands_escape_password() {
        assert!(build_commands(Some("a\"b")).starts_with("AUTHENTICATE \"a\\\"b\"\r\n"));
    }

    #[test]
    fn test_check_reply() {
        assert!(check_reply("250 OK\r\n250 OK\r\n250 closing connection\r\n").is_ok());
        assert!(check_reply("515 Authentication failed\r\n").is_err());
        assert!(check_reply("").is_err());
    }

    #[tokio::test]
    async fn test_renew_against_fake_control_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0_u8; 256];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"250 OK\r\n250 OK\r\n250 closing connection\r\n").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        CircuitRenewer::new(addr.to_string(), None).renew().await.unwrap();
        let received = server.await.unwrap();
        assert!(received.contains("SIGNAL NEWNYM"));
    }
}
