use rand::{distributions::Alphanumeric, Rng};

const KEY_LENGTH: usize = 48;

/// Passphrase handed to the encryptor and to the panel. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::thread_rng())
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let key = rng
            .sample_iter(&Alphanumeric)
            .take(KEY_LENGTH)
            .map(char::from)
            .collect();
        EncryptionKey(key)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EncryptionKey {
    fn from(s: &str) -> Self {
        EncryptionKey(s.to_owned())
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(***)")
    }
}
