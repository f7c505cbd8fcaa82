//! Connection startup and authentication state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::backend::{
    AuthenticationMessage, BackendKeyData, ErrorResponse, ParameterStatus, ReadyForQuery,
    is_async_type, msg_type,
};
use crate::protocol::frontend::auth::{ScramClient, md5_password};
use crate::protocol::frontend::{
    write_password, write_sasl_initial_response, write_sasl_response, write_startup,
};
use crate::protocol::types::TransactionStatus;

use super::StateMachine;
use super::action::{Action, AsyncMessage};

const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// Connection state during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    WaitingAuth,
    SaslInProgress,
    WaitingAuthResult,
    WaitingReady,
    Ready,
    Failed,
}

/// Connection startup state machine.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    options: Opts,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    transaction_status: TransactionStatus,
    scram_client: Option<ScramClient>,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(options: Opts) -> Self {
        Self {
            state: ConnectionState::Initial,
            options,
            backend_key: None,
            server_params: Vec::new(),
            transaction_status: TransactionStatus::Idle,
            scram_client: None,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get the backend key data (for cancellation).
    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Get server parameters.
    pub fn server_params(&self) -> &[(String, String)] {
        &self.server_params
    }

    /// Take the server parameters collected during startup.
    pub fn take_server_params(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.server_params)
    }

    /// Get the current transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    fn password(&self) -> Result<&str> {
        self.options
            .password
            .as_deref()
            .ok_or_else(|| Error::Auth("Password required but not provided".into()))
    }

    fn write_startup_message(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut params: Vec<(&str, &str)> = vec![
            ("user", &self.options.user),
            ("client_encoding", "UTF8"),
        ];

        if let Some(db) = &self.options.database {
            params.push(("database", db));
        }

        if let Some(app) = &self.options.application_name {
            params.push(("application_name", app));
        }

        for (name, value) in &self.options.params {
            params.push((name, value));
        }

        write_startup(buf, params)
    }

    fn handle_auth_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let auth = AuthenticationMessage::parse(&buffer_set.read_buffer)?;
        let buf = &mut buffer_set.write_buffer;

        match auth {
            AuthenticationMessage::Ok => {
                self.state = ConnectionState::WaitingReady;
                Ok(Action::ReadMessage)
            }
            AuthenticationMessage::CleartextPassword => {
                buf.clear();
                write_password(buf, self.password()?)?;
                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::Md5Password { salt } => {
                let hashed = md5_password(&self.options.user, self.password()?, &salt);
                buf.clear();
                write_password(buf, &hashed)?;
                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                if !mechanisms.contains(&SCRAM_SHA_256) {
                    return Err(Error::Auth(format!(
                        "No supported SASL mechanism. Server offers: {:?}",
                        mechanisms
                    )));
                }

                let scram = ScramClient::new(self.password()?);
                buf.clear();
                write_sasl_initial_response(
                    buf,
                    SCRAM_SHA_256,
                    scram.client_first_message().as_bytes(),
                )?;

                self.scram_client = Some(scram);
                self.state = ConnectionState::SaslInProgress;
                Ok(Action::WriteAndReadMessage)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected authentication message: {:?}",
                other
            ))),
        }
    }

    fn handle_sasl_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let auth = AuthenticationMessage::parse(&buffer_set.read_buffer)?;
        let scram = self
            .scram_client
            .as_mut()
            .ok_or_else(|| Error::Protocol("SCRAM client not initialized".into()))?;

        match auth {
            AuthenticationMessage::SaslContinue { data } => {
                let server_first = simdutf8::compat::from_utf8(data)
                    .map_err(|e| Error::Auth(format!("Invalid server-first-message: {}", e)))?;
                let client_final = scram.process_server_first(server_first)?;

                let buf = &mut buffer_set.write_buffer;
                buf.clear();
                write_sasl_response(buf, client_final.as_bytes())?;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::SaslFinal { data } => {
                let server_final = simdutf8::compat::from_utf8(data)
                    .map_err(|e| Error::Auth(format!("Invalid server-final-message: {}", e)))?;
                scram.verify_server_final(server_final)?;

                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected SASL message: {:?}",
                other
            ))),
        }
    }

    fn handle_auth_result(&mut self, buffer_set: &BufferSet) -> Result<Action> {
        match AuthenticationMessage::parse(&buffer_set.read_buffer)? {
            AuthenticationMessage::Ok => {
                self.state = ConnectionState::WaitingReady;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Auth(format!("Unexpected auth result: {:?}", other))),
        }
    }

    fn handle_ready_message(&mut self, buffer_set: &BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;

        match buffer_set.type_byte {
            msg_type::BACKEND_KEY_DATA => {
                self.backend_key = Some(*BackendKeyData::parse(payload)?);
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                self.transaction_status = ReadyForQuery::parse(payload)?.transaction_status()?;
                self.state = ConnectionState::Ready;
                Ok(Action::Finished)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message during startup: '{}'",
                other as char
            ))),
        }
    }

    fn record_parameter(&mut self, payload: &[u8]) -> Result<()> {
        let param = ParameterStatus::parse(payload)?;
        match self.server_params.iter_mut().find(|(n, _)| n == param.name) {
            Some(entry) => entry.1 = param.value.to_string(),
            None => self
                .server_params
                .push((param.name.to_string(), param.value.to_string())),
        }
        Ok(())
    }

    fn step_inner(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;

        if type_byte == msg_type::PARAMETER_STATUS {
            self.record_parameter(&buffer_set.read_buffer)?;
            return Ok(Action::ReadMessage);
        }

        if is_async_type(type_byte) {
            let msg = AsyncMessage::parse(type_byte, &buffer_set.read_buffer)?;
            return Ok(Action::HandleAsyncMessageAndReadMessage(msg));
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            return Err(error.into_error());
        }

        match (self.state, type_byte) {
            (ConnectionState::WaitingAuth, msg_type::AUTHENTICATION) => {
                self.handle_auth_message(buffer_set)
            }
            (ConnectionState::SaslInProgress, msg_type::AUTHENTICATION) => {
                self.handle_sasl_message(buffer_set)
            }
            (ConnectionState::WaitingAuthResult, msg_type::AUTHENTICATION) => {
                self.handle_auth_result(buffer_set)
            }
            (ConnectionState::WaitingReady, _) => self.handle_ready_message(buffer_set),
            (state, other) => Err(Error::Protocol(format!(
                "Unexpected message '{}' in state {:?}",
                other as char, state
            ))),
        }
    }
}

impl StateMachine for ConnectionStateMachine {
    /// Queue the StartupMessage.
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        buffer_set.write_buffer.clear();
        self.write_startup_message(&mut buffer_set.write_buffer)?;
        self.state = ConnectionState::WaitingAuth;
        Ok(Action::WriteAndReadMessage)
    }

    /// Process a message from the server.
    ///
    /// Every error is fatal to the connection attempt.
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let result = self.step_inner(buffer_set);
        if result.is_err() {
            self.state = ConnectionState::Failed;
        }
        result
    }
}

/// Check that `current` is the backend a transaction was started on.
///
/// Without BackendKeyData on either side the check cannot be made and
/// passes.
pub(crate) fn check_same_backend(started: Option<u32>, current: Option<u32>) -> Result<()> {
    match (started, current) {
        (Some(started), Some(current)) if started != current => Err(Error::InvalidUsage(format!(
            "connection mismatch: expected {}, got {}",
            started, current
        ))),
        _ => Ok(()),
    }
}
