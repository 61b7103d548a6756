use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::model::SelectionRecord;
use crate::records::docstore::Document;
use crate::records::USERS;
use crate::{Error, Result, SelectionRecords};

/// TCP client for a record daemon (see [`crate::records::Router`]).
///
/// One connection is shared and re-established on demand; a command is retried
/// up to three times when the connection drops underneath it.
pub struct RecordClient {
    addr: String,
    inner: Mutex<Option<ClientInner>>,
}

struct ClientInner {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

/// Ids travel as protocol tokens and must not contain whitespace.
fn check_token(token: &str) -> Result<()> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(Error::Internal(format!("invalid identifier: {:?}", token)));
    }
    Ok(())
}

fn payload(resp: &str) -> Result<&str> {
    resp.strip_prefix("OK ").ok_or_else(|| Error::Internal("Invalid response".to_string()))
}

impl RecordClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let inner = RecordClient::connect_inner(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    /// Creates a client that connects on first use.
    pub fn lazy(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            inner: Mutex::new(None),
        }
    }

    async fn connect_inner(addr: &str) -> Result<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn send_and_receive(&self, cmd: String) -> Result<String> {
        let mut inner_guard = self.inner.lock().await;

        for i in 0..3u64 {
            if inner_guard.is_none() {
                match RecordClient::connect_inner(&self.addr).await {
                    Ok(inner) => *inner_guard = Some(inner),
                    Err(e) => {
                        if i == 2 {
                            return Err(e);
                        }
                        tokio::time::sleep(std::time::Duration::from_millis((i + 1) * 200)).await;
                        continue;
                    }
                }
            }

            let Some(inner) = inner_guard.as_mut() else {
                continue;
            };
            if inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await.is_err() {
                *inner_guard = None;
                continue;
            }

            let mut resp = String::new();
            match inner.reader.read_line(&mut resp).await {
                Ok(0) | Err(_) => {
                    *inner_guard = None;
                    continue;
                }
                Ok(_) => {
                    let resp = resp.trim();
                    if let Some(msg) = resp.strip_prefix("ERR") {
                        let msg = msg.trim();
                        if msg == Error::DocumentNotFound.to_string() {
                            return Err(Error::DocumentNotFound);
                        }
                        return Err(Error::Remote(msg.to_string()));
                    }
                    return Ok(resp.to_string());
                }
            }
        }

        Err(Error::Internal("failed after 3 attempts".to_string()))
    }

    pub async fn ping(&self) -> Result<()> {
        match self.send_and_receive("PING".to_string()).await?.as_str() {
            "PONG" => Ok(()),
            other => Err(Error::Internal(format!("unexpected reply: {}", other))),
        }
    }

    pub async fn get_document(&self, collection: &str, id: &str) -> Result<Document> {
        check_token(collection)?;
        check_token(id)?;
        let resp = self.send_and_receive(format!("GET {} {}", collection, id)).await?;
        Ok(serde_json::from_str(payload(&resp)?)?)
    }

    pub async fn merge_document(&self, collection: &str, id: &str, fields: &Document) -> Result<()> {
        check_token(collection)?;
        check_token(id)?;
        let body = serde_json::to_string(fields)?;
        self.send_and_receive(format!("MERGE {} {} {}", collection, id, body)).await?;
        Ok(())
    }

    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        check_token(collection)?;
        check_token(id)?;
        self.send_and_receive(format!("DEL {} {}", collection, id)).await?;
        Ok(())
    }

    pub async fn list_documents(&self, collection: &str) -> Result<Vec<String>> {
        check_token(collection)?;
        let resp = self.send_and_receive(format!("LIST {}", collection)).await?;
        Ok(serde_json::from_str(payload(&resp)?)?)
    }
}

#[async_trait]
impl SelectionRecords for RecordClient {
    async fn fetch(&self, uid: &str) -> Result<Option<SelectionRecord>> {
        match self.get_document(USERS, uid).await {
            Ok(doc) => Ok(Some(serde_json::from_value(Value::Object(doc))?)),
            Err(Error::DocumentNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn merge(&self, uid: &str, record: &SelectionRecord) -> Result<()> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => self.merge_document(USERS, uid, &fields).await,
            _ => Err(Error::Internal("selection record is not an object".to_string())),
        }
    }
}
