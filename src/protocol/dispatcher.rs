use crate::core::codec::RequestFrame;
use crate::core::frame::{
    ClientId, RequestCode, RequestHeader, PROTOCOL_VERSION, REQUEST_HEADER_SIZE,
};
use crate::core::message::{Request, RequestBody, Response};
use crate::error::{constants, ProtocolError, Result};
use crate::store::{is_valid_name, ClientSessions, FileVault, Persistence};
use crate::utils::crypto::{self, SymmetricKey};
use crate::utils::metrics::{Metrics, Timer};
use chrono::Utc;
use rsa::RsaPublicKey;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Request-code state machine.
///
/// Owns the client session cache and the file vault. Each call to [`Dispatcher::dispatch`]
/// serves one request frame and yields at most one response; no state is kept per
/// connection.
pub struct Dispatcher<P: Persistence> {
    sessions: ClientSessions<P>,
    vault: FileVault,
    metrics: Arc<Metrics>,
}

impl<P: Persistence> Dispatcher<P> {
    pub fn new(sessions: ClientSessions<P>, vault: FileVault, metrics: Arc<Metrics>) -> Self {
        Self {
            sessions,
            vault,
            metrics,
        }
    }

    pub fn sessions(&self) -> &ClientSessions<P> {
        &self.sessions
    }

    pub fn vault(&self) -> &FileVault {
        &self.vault
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Serve one request frame.
    ///
    /// Returns `None` only for CRC_WRONG_AGAIN. Any failure, including an unknown code or
    /// an unparseable payload, becomes GENERAL_ERROR. `lastSeen` of the header's client id
    /// is refreshed whatever the outcome.
    #[instrument(skip(self, frame), fields(client_id = %frame.header.client_id, code = frame.header.code))]
    pub fn dispatch(&mut self, frame: RequestFrame) -> Option<Response> {
        let _timer = Timer::start("dispatch");
        let header = frame.header;
        self.metrics
            .request_received((REQUEST_HEADER_SIZE + frame.payload.len()) as u64);
        debug!(
            request = RequestCode::try_from(header.code).map_or("UNKNOWN", RequestCode::name),
            payload = header.payload_size,
            "Dispatching request"
        );

        if header.version != PROTOCOL_VERSION {
            warn!(
                version = header.version,
                expected = PROTOCOL_VERSION,
                "Client speaks a different protocol version"
            );
        }

        let outcome = frame.into_request().and_then(|request| self.handle(request));
        self.touch(&header.client_id);

        match outcome {
            Ok(Some(response)) => Some(response),
            Ok(None) => {
                self.metrics.silent_request();
                None
            }
            Err(e) => Some(self.reject(&e)),
        }
    }

    /// Route a decoded request to its handler.
    pub fn handle(&mut self, request: Request) -> Result<Option<Response>> {
        let id = request.client_id;
        let response = match request.body {
            RequestBody::Register { name } => self.register(&name)?,
            RequestBody::PublicKey { name, public_key } => {
                self.public_key(id, &name, &public_key)?
            }
            RequestBody::Reconnect { name } => self.reconnect(id, &name)?,
            RequestBody::FileSend {
                filename,
                ciphertext,
                ..
            } => self.file_send(id, filename, &ciphertext)?,
            RequestBody::CrcGood { filename } => self.crc_good(id, &filename)?,
            RequestBody::CrcWrongAgain { filename } => {
                info!(%filename, "Checksum mismatch, client will resend");
                return Ok(None);
            }
            RequestBody::CrcWrongDone { filename } => {
                warn!(%filename, "Client gave up on file after repeated checksum mismatches");
                Response::MessageReceived { client_id: id }
            }
        };
        Ok(Some(response))
    }

    /// GENERAL_ERROR for a request that could not be served.
    pub fn reject(&self, error: &ProtocolError) -> Response {
        self.metrics.general_error();
        if error.is_frame_error() {
            warn!(error = %error, "Malformed request");
        } else {
            warn!(error = %error, "Request failed");
        }
        Response::GeneralError
    }

    /// GENERAL_ERROR for a frame the codec could not complete.
    ///
    /// When the header itself decoded, its client id still counts as seen.
    pub fn reject_frame(
        &mut self,
        header: Option<RequestHeader>,
        error: &ProtocolError,
    ) -> Response {
        if let Some(header) = header {
            self.touch(&header.client_id);
        }
        self.reject(error)
    }

    fn touch(&mut self, id: &ClientId) {
        if let Err(e) = self.sessions.touch(id, Utc::now()) {
            warn!(error = %e, "Failed to update last seen");
        }
    }

    fn register(&mut self, name: &str) -> Result<Response> {
        if !is_valid_name(name) {
            info!(name, "Registration refused: invalid name");
            return Ok(Response::RegisterFailed);
        }

        match self.sessions.register(name)? {
            Some(record) => {
                self.metrics.registration();
                info!(client_id = %record.id, name, "Registered client");
                Ok(Response::RegisterSucceeded {
                    client_id: record.id,
                })
            }
            None => {
                info!(name, "Registration refused: name already taken");
                Ok(Response::RegisterFailed)
            }
        }
    }

    fn public_key(&mut self, id: ClientId, name: &str, field: &[u8]) -> Result<Response> {
        self.require_client(&id)?;
        let public_key = crypto::parse_public_key(field)?;

        self.sessions.set_public_key(&id, field)?;
        let wrapped_key = self.issue_key(id, &public_key)?;
        info!(name, "Stored public key and issued symmetric key");
        Ok(Response::PublicKeyReceived {
            client_id: id,
            wrapped_key,
        })
    }

    fn reconnect(&mut self, id: ClientId, name: &str) -> Result<Response> {
        let Some(field) = self.sessions.public_key(&id).map(<[u8]>::to_vec) else {
            info!(name, "Reconnect refused: unknown client or no public key");
            return Ok(Response::ReconnectFailed { client_id: id });
        };

        let public_key = crypto::parse_public_key(&field)?;
        let wrapped_key = self.issue_key(id, &public_key)?;
        info!(name, "Client reconnected");
        Ok(Response::ReconnectAccepted {
            client_id: id,
            wrapped_key,
        })
    }

    fn file_send(&mut self, id: ClientId, filename: String, ciphertext: &[u8]) -> Result<Response> {
        let key = self.symmetric_key(&id)?;
        let plaintext = crypto::decrypt_file(ciphertext, &key)?;
        let checksum = crypto::checksum(&plaintext);

        // Blob first, so a failed write never leaves a metadata row behind.
        let path = self.vault.save(&id, &filename, &plaintext)?;
        self.sessions
            .store_mut()
            .replace_file(&id, &filename, &path)?;

        self.metrics.file_received();
        info!(%filename, bytes = plaintext.len(), checksum, "Received file");
        Ok(Response::FileReceived {
            client_id: id,
            content_size: plaintext.len() as u32,
            filename,
            checksum,
        })
    }

    fn crc_good(&mut self, id: ClientId, filename: &str) -> Result<Response> {
        self.require_client(&id)?;
        self.sessions.store_mut().mark_file_verified(&id, filename)?;
        self.metrics.file_verified();
        info!(filename, "File verified");
        Ok(Response::MessageReceived { client_id: id })
    }

    /// Generate, persist and wrap a fresh symmetric key for `id`.
    fn issue_key(&mut self, id: ClientId, public_key: &RsaPublicKey) -> Result<Vec<u8>> {
        let key = crypto::generate_aes_key();
        let wrapped = crypto::wrap_key(public_key, &key)?;
        self.sessions.set_aes_key(&id, key)?;
        self.metrics.key_issued();
        debug!(wrapped_len = wrapped.len(), "Issued symmetric key");
        Ok(wrapped)
    }

    fn require_client(&self, id: &ClientId) -> Result<()> {
        if self.sessions.exists_by_id(id) {
            return Ok(());
        }
        debug!("{}", constants::ERR_UNKNOWN_CLIENT);
        Err(ProtocolError::UnknownClient(id.to_hex()))
    }

    fn symmetric_key(&self, id: &ClientId) -> Result<SymmetricKey> {
        self.require_client(id)?;
        self.sessions.aes_key(id).ok_or_else(|| {
            debug!("{}", constants::ERR_MISSING_AES_KEY);
            ProtocolError::MissingSymmetricKey(id.to_hex())
        })
    }
}
