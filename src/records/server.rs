use std::sync::Arc;

use log::{error, info};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::records::{valid_identifier, DocStore};
use crate::Result;

/// TCP front end of a [`DocStore`].
///
/// The protocol is line based: one command per line, one reply per line.
///
/// ```text
/// PING                         -> PONG
/// GET <collection> <id>        -> OK <json-object> | ERR document not found
/// MERGE <collection> <id> <obj> -> OK
/// DEL <collection> <id>        -> OK
/// LIST <collection>            -> OK <json-array>
/// QUIT
/// ```
pub struct Router {
    store: Arc<DocStore>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self::with_max_connections(store, 100)
    }

    pub fn with_max_connections(store: Arc<DocStore>, max: usize) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(max)),
        }
    }

    pub async fn listen(&self, port: &str) -> Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Record store listening on port {}", port);
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, peer) = listener.accept().await?;
            let store = self.store.clone();
            let permit = match self.semaphore.clone().try_acquire_owned() {
                Ok(p) => p,
                Err(_) => {
                    error!("Server busy: too many concurrent connections. Rejecting {}", peer);
                    let mut socket = socket;
                    let _ = socket.shutdown().await;
                    continue;
                }
            };

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_connection(socket, store).await {
                    error!("Connection error from {}: {}", peer, e);
                }
            });
        }
    }
}

fn err_line(e: impl std::fmt::Display) -> String {
    format!("ERR {}", e.to_string().to_lowercase())
}

const INVALID_IDENTIFIER: &str = "ERR invalid identifier";

/// Splits off the first token, skipping any run of whitespace before it.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    Some(input.split_once(char::is_whitespace).unwrap_or((input, "")))
}

/// Command, up to two identifier tokens, then the untouched rest of the line
/// as a final argument.
fn tokenize(line: &str) -> Option<(String, Vec<&str>)> {
    let (command, mut rest) = next_token(line)?;
    let mut args = Vec::with_capacity(3);
    while args.len() < 2 {
        let Some((token, tail)) = next_token(rest) else {
            break;
        };
        args.push(token);
        rest = tail;
    }
    let body = rest.trim();
    if !body.is_empty() {
        args.push(body);
    }
    Some((command.to_uppercase(), args))
}

fn both_valid(collection: &str, id: &str) -> bool {
    valid_identifier(collection) && valid_identifier(id)
}

async fn dispatch(store: &DocStore, line: &str) -> Option<String> {
    let (command, args) = tokenize(line)?;

    let response = match command.as_str() {
        "GET" => match args.as_slice() {
            [collection, id] if !both_valid(collection, id) => INVALID_IDENTIFIER.to_string(),
            [collection, id] => match store.get(collection, id).await {
                Ok(doc) => match serde_json::to_string(&doc) {
                    Ok(s) => format!("OK {}", s),
                    Err(e) => err_line(e),
                },
                Err(e) => err_line(e),
            },
            _ => "ERR missing arguments".to_string(),
        },
        "MERGE" => match args.as_slice() {
            [collection, id, _] if !both_valid(collection, id) => INVALID_IDENTIFIER.to_string(),
            [collection, id, body] => match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(fields)) => match store.merge_fields(collection, id, fields).await {
                    Ok(()) => "OK".to_string(),
                    Err(e) => err_line(e),
                },
                Ok(_) => "ERR merge body must be a json object".to_string(),
                Err(_) => "ERR invalid json value".to_string(),
            },
            _ => "ERR missing arguments".to_string(),
        },
        "DEL" => match args.as_slice() {
            [collection, id] if !both_valid(collection, id) => INVALID_IDENTIFIER.to_string(),
            [collection, id] => match store.delete(collection, id).await {
                Ok(()) => "OK".to_string(),
                Err(e) => err_line(e),
            },
            _ => "ERR missing arguments".to_string(),
        },
        "LIST" => match args.as_slice() {
            [collection] if !valid_identifier(collection) => INVALID_IDENTIFIER.to_string(),
            [collection] => match store.list(collection).await {
                Ok(ids) => match serde_json::to_string(&ids) {
                    Ok(s) => format!("OK {}", s),
                    Err(e) => err_line(e),
                },
                Err(e) => err_line(e),
            },
            _ => "ERR missing arguments".to_string(),
        },
        "PING" => "PONG".to_string(),
        "QUIT" => return None,
        _ => "ERR unknown command".to_string(),
    };
    Some(response)
}

pub async fn handle_connection(mut socket: TcpStream, store: Arc<DocStore>) -> Result<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match dispatch(&store, trimmed).await {
            Some(response) => writer.write_all(format!("{}\n", response).as_bytes()).await?,
            None => break,
        }
    }
    Ok(())
}
