use futures::{SinkExt, StreamExt};
use rsa::pkcs8::EncodePublicKey;
use rsa::{BigUint, RsaPrivateKey};
use rand_core::OsRng;
use std::path::Path;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::ClientCodec;
use crate::core::frame::{ClientId, PUBLIC_KEY_SIZE};
use crate::core::message::{Request, RequestBody, Response};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{self, SymmetricKey};

/// FILE_SEND attempts before the client gives up on a file
pub const MAX_TRIES: usize = 3;

/// RSA modulus size whose SPKI DER fits the 160 byte public key field
pub const CLIENT_KEY_BITS: usize = 1024;
pub const CLIENT_KEY_EXPONENT: u32 = 17;

/// Generate an RSA key pair whose public half fits the wire field
pub fn generate_client_key() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new_with_exp(
        &mut OsRng,
        CLIENT_KEY_BITS,
        &BigUint::from(CLIENT_KEY_EXPONENT),
    )
    .map_err(|e| ProtocolError::InvalidPublicKey(format!("key generation failed: {e}")))
}

/// DER `SubjectPublicKeyInfo` of `private_key`'s public half, as sent in PUBLIC_KEY.
pub fn public_key_der(private_key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?
        .as_bytes()
        .to_vec();
    if der.len() > PUBLIC_KEY_SIZE {
        return Err(ProtocolError::InvalidPublicKey(format!(
            "encoded key is {} bytes, field holds {PUBLIC_KEY_SIZE}",
            der.len()
        )));
    }
    Ok(der)
}

/// Client for the backup server.
///
/// Every call opens its own TCP connection and carries exactly one request, matching
/// the server's one-request-per-connection model. The client keeps its id and the
/// current symmetric key between calls.
///
/// # Example
/// ```ignore
/// let key = generate_client_key()?;
/// let mut client = BackupClient::new("127.0.0.1:1234", "alice", key);
/// client.register().await?;
/// client.send_public_key().await?;
/// client.backup_file("notes.txt", b"hello world").await?;
/// ```
pub struct BackupClient {
    address: String,
    name: String,
    client_id: ClientId,
    private_key: RsaPrivateKey,
    aes_key: Option<SymmetricKey>,
    codec: ClientCodec,
}

impl BackupClient {
    pub fn new(address: impl Into<String>, name: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            client_id: ClientId::ZERO,
            private_key,
            aes_key: None,
            codec: ClientCodec::default(),
        }
    }

    /// Resume as an already registered client
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aes_key(&self) -> Option<SymmetricKey> {
        self.aes_key
    }

    /// REGISTER. Returns the new id, or `None` if the server refused the name.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn register(&mut self) -> Result<Option<ClientId>> {
        let body = RequestBody::Register {
            name: self.name.clone(),
        };
        match self.request(body).await? {
            Response::RegisterSucceeded { client_id } => {
                info!(%client_id, "Registered");
                self.client_id = client_id;
                Ok(Some(client_id))
            }
            Response::RegisterFailed => {
                warn!("Registration refused");
                Ok(None)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// PUBLIC_KEY, then unwrap and keep the symmetric key the server issued.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn send_public_key(&mut self) -> Result<SymmetricKey> {
        let body = RequestBody::PublicKey {
            name: self.name.clone(),
            public_key: public_key_der(&self.private_key)?,
        };
        match self.request(body).await? {
            Response::PublicKeyReceived { wrapped_key, .. } => self.accept_key(&wrapped_key),
            other => Err(unexpected(&other)),
        }
    }

    /// RECONNECT. Returns `false` if the server does not know this client's key.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn reconnect(&mut self) -> Result<bool> {
        let body = RequestBody::Reconnect {
            name: self.name.clone(),
        };
        match self.request(body).await? {
            Response::ReconnectAccepted { wrapped_key, .. } => {
                self.accept_key(&wrapped_key)?;
                Ok(true)
            }
            Response::ReconnectFailed { .. } => {
                warn!("Reconnect refused");
                Ok(false)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// One FILE_SEND. Returns whether the server's checksum matches the local one.
    pub async fn send_file(&self, filename: &str, contents: &[u8]) -> Result<bool> {
        let key = self
            .aes_key
            .ok_or_else(|| ProtocolError::MissingSymmetricKey(self.client_id.to_hex()))?;
        let ciphertext = crypto::encrypt_file(contents, &key);
        let body = RequestBody::FileSend {
            content_size: ciphertext.len() as u32,
            filename: filename.to_string(),
            ciphertext,
        };

        match self.request(body).await? {
            Response::FileReceived { checksum, .. } => {
                let expected = crypto::checksum(contents);
                debug!(checksum, expected, "Server checksum");
                Ok(checksum == expected)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Send a file through the verify/retry exchange.
    ///
    /// Up to [`MAX_TRIES`] FILE_SEND attempts. A mismatch is reported with CRC_WRONG_AGAIN
    /// (which gets no reply) before the next attempt; after the last failed attempt the
    /// client sends CRC_WRONG_DONE. Returns whether the server ended up with a verified copy.
    #[instrument(skip(self, contents), fields(client_id = %self.client_id, bytes = contents.len()))]
    pub async fn backup_file(&self, filename: &str, contents: &[u8]) -> Result<bool> {
        for attempt in 1..=MAX_TRIES {
            if self.send_file(filename, contents).await? {
                self.expect_ack(RequestBody::CrcGood {
                    filename: filename.to_string(),
                })
                .await?;
                info!(attempt, "File verified by server");
                return Ok(true);
            }

            warn!(attempt, "Checksum mismatch");
            if attempt < MAX_TRIES {
                self.send_only(RequestBody::CrcWrongAgain {
                    filename: filename.to_string(),
                })
                .await?;
            }
        }

        self.expect_ack(RequestBody::CrcWrongDone {
            filename: filename.to_string(),
        })
        .await?;
        warn!("Giving up on file");
        Ok(false)
    }

    /// [`backup_file`](Self::backup_file) for a file on disk, named by its last path component.
    pub async fn backup_path(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ProtocolError::InvalidFilename(path.display().to_string()))?;
        let contents = tokio::fs::read(path).await?;
        self.backup_file(filename, &contents).await
    }

    fn accept_key(&mut self, wrapped_key: &[u8]) -> Result<SymmetricKey> {
        let key = crypto::unwrap_key(&self.private_key, wrapped_key)?;
        self.aes_key = Some(key);
        debug!("Symmetric key installed");
        Ok(key)
    }

    async fn expect_ack(&self, body: RequestBody) -> Result<()> {
        match self.request(body).await? {
            Response::MessageReceived { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, ClientCodec>> {
        let stream = TcpStream::connect(&self.address).await?;
        Ok(Framed::new(stream, self.codec))
    }

    /// Send one request and wait for its response.
    pub async fn request(&self, body: RequestBody) -> Result<Response> {
        let mut framed = self.connect().await?;
        framed.send(Request::new(self.client_id, body)).await?;
        match framed.next().await {
            Some(response) => response,
            None => {
                debug!("{}", constants::ERR_CONNECTION_CLOSED);
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Send one request that the server answers by closing the connection.
    pub async fn send_only(&self, body: RequestBody) -> Result<()> {
        let mut framed = self.connect().await?;
        framed.send(Request::new(self.client_id, body)).await?;
        // Wait for the close so the next request is not raced against this one.
        if let Some(frame) = framed.next().await {
            return Err(unexpected(&frame?));
        }
        Ok(())
    }
}

fn unexpected(response: &Response) -> ProtocolError {
    ProtocolError::UnexpectedResponse(format!(
        "{:?} (code {})",
        response.code(),
        response.code().as_u16()
    ))
}
