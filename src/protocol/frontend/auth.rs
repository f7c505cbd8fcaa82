//! Authentication messages and the SCRAM-SHA-256 exchange.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

/// Write a PasswordMessage (cleartext or MD5 hashed password).
pub fn write_password(buf: &mut Vec<u8>, password: &str) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish()
}

/// Compute MD5 password hash.
///
/// PostgreSQL MD5 password format: "md5" + md5(md5(password + username) + salt)
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    use md5::Md5;

    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(username.as_bytes());
    let first_hash_hex = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(first_hash_hex.as_bytes());
    hasher.update(salt);
    format!("md5{:x}", hasher.finalize())
}

/// Write a SASLInitialResponse message.
pub fn write_sasl_initial_response(
    buf: &mut Vec<u8>,
    mechanism: &str,
    initial_response: &[u8],
) -> Result<()> {
    let len = i32::try_from(initial_response.len())
        .map_err(|_| Error::Auth("SASL response too large".into()))?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(mechanism);
    msg.write_i32(len);
    msg.write_bytes(initial_response);
    msg.finish()
}

/// Write a SASLResponse message.
pub fn write_sasl_response(buf: &mut Vec<u8>, response: &[u8]) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_bytes(response);
    msg.finish()
}

type HmacSha256 = Hmac<Sha256>;

fn hmac(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Auth(format!("HMAC error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// SCRAM-SHA-256 client without channel binding.
pub struct ScramClient {
    nonce: String,
    /// Sent as `n=`; PostgreSQL takes the user from the startup message
    username: String,
    password: String,
    auth_message: Option<String>,
    salted_password: Option<[u8; 32]>,
}

impl ScramClient {
    /// Create a new SCRAM client with a random 24-byte nonce.
    pub fn new(password: &str) -> Self {
        use rand::Rng;

        let mut nonce_bytes = [0u8; 24];
        rand::rng().fill(&mut nonce_bytes);
        Self::with_nonce("", password, BASE64.encode(nonce_bytes))
    }

    pub(crate) fn with_nonce(username: &str, password: &str, nonce: String) -> Self {
        Self {
            nonce,
            username: username.to_string(),
            password: password.to_string(),
            auth_message: None,
            salted_password: None,
        }
    }

    fn client_first_message_bare(&self) -> String {
        format!("n={},r={}", self.username, self.nonce)
    }

    /// Generate the client-first-message.
    pub fn client_first_message(&self) -> String {
        format!("n,,{}", self.client_first_message_bare())
    }

    /// Process server-first-message and generate client-final-message.
    pub fn process_server_first(&mut self, server_first: &str) -> Result<String> {
        let mut combined_nonce = None;
        let mut salt_b64 = None;
        let mut iterations = None;

        for part in server_first.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                combined_nonce = Some(value);
            } else if let Some(value) = part.strip_prefix("s=") {
                salt_b64 = Some(value);
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations = value.parse::<u32>().ok();
            }
        }

        let missing = |what: &str| Error::Auth(format!("Missing {what} in server-first-message"));
        let combined_nonce = combined_nonce.ok_or_else(|| missing("nonce"))?;
        let salt_b64 = salt_b64.ok_or_else(|| missing("salt"))?;
        let iterations = iterations.ok_or_else(|| missing("iterations"))?;

        if !combined_nonce.starts_with(&self.nonce) {
            return Err(Error::Auth(
                "Server nonce doesn't start with client nonce".into(),
            ));
        }

        let salt = BASE64
            .decode(salt_b64)
            .map_err(|e| Error::Auth(format!("Invalid salt: {}", e)))?;

        // SaltedPassword = Hi(Normalize(password), salt, iterations)
        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );
        self.salted_password = Some(salted_password);

        let client_key = hmac(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(client_key);

        // "biws" is base64("n,,")
        let client_final_without_proof = format!("c=biws,r={}", combined_nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_message_bare(),
            server_first,
            client_final_without_proof
        );

        let client_signature = hmac(&stored_key, auth_message.as_bytes())?;
        self.auth_message = Some(auth_message);

        let mut client_proof = client_key;
        for (proof, sig) in client_proof.iter_mut().zip(client_signature) {
            *proof ^= sig;
        }

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(client_proof)
        ))
    }

    /// Verify server-final-message.
    pub fn verify_server_final(&self, server_final: &str) -> Result<()> {
        let server_signature_b64 = server_final
            .strip_prefix("v=")
            .ok_or_else(|| Error::Auth("Invalid server-final-message format".into()))?;
        let server_signature = BASE64
            .decode(server_signature_b64)
            .map_err(|e| Error::Auth(format!("Invalid server signature: {}", e)))?;

        let (Some(salted_password), Some(auth_message)) =
            (self.salted_password.as_ref(), self.auth_message.as_ref())
        else {
            return Err(Error::Auth(
                "server-final-message before server-first-message".into(),
            ));
        };

        let server_key = hmac(salted_password, b"Server Key")?;
        let expected = hmac(&server_key, auth_message.as_bytes())?;

        if server_signature.as_slice() != expected.as_slice() {
            return Err(Error::Auth("Server signature verification failed".into()));
        }
        Ok(())
    }
}
