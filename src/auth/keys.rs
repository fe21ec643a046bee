//! Signing Key Store
//!
//! Owns the single P-256 keypair used to sign access tokens. The private key
//! is persisted as PKCS#8 PEM and the public key as SPKI PEM under the
//! certificate directory. Loading also accepts SEC1 (`EC PRIVATE KEY`) DER
//! for keys written by older deployments.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use p256::pkcs8::der::pem;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::configuration::AuthSettings;
use crate::error::KeyError;

/// The process-wide signing keypair.
///
/// Built once at startup and shared read-only.
#[derive(Clone)]
pub struct SigningKeypair {
    secret: SecretKey,
    public: PublicKey,
}

impl SigningKeypair {
    /// Generate a fresh keypair from the OS random source
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// PKCS#8 DER encoding of the private key
    pub(crate) fn private_key_der(&self) -> Result<Vec<u8>, KeyError> {
        self.secret
            .to_pkcs8_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyError::Encode(e.to_string()))
    }

    fn private_key_pem(&self) -> Result<String, KeyError> {
        self.secret
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| KeyError::Encode(e.to_string()))
    }

    /// SPKI PEM encoding of the public key
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encode(e.to_string()))
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Location of the keypair on disk
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    name: String,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.certs_dir.clone(), settings.key_name.clone())
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(format!("{}.key", self.name))
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(format!("{}.pub", self.name))
    }

    /// Load the keypair, generating and persisting one on first run.
    ///
    /// # Errors
    /// Any error here is fatal for the process: the directory cannot be
    /// created, the files cannot be written, or an existing private key
    /// cannot be parsed.
    pub fn ensure_keypair(&self) -> Result<SigningKeypair, KeyError> {
        let private_path = self.private_key_path();

        if private_path.exists() {
            tracing::debug!(path = %private_path.display(), "Loading signing key");
            let keypair = self.load()?;

            let public_path = self.public_key_path();
            if !public_path.exists() {
                tracing::warn!(path = %public_path.display(), "Public key file missing, rewriting it");
                write_key_file(&public_path, keypair.public_key_pem()?.as_bytes())?;
            }
            return Ok(keypair);
        }

        tracing::info!(dir = %self.dir.display(), "Generating signing keypair");
        let keypair = SigningKeypair::generate();
        self.persist(&keypair)?;
        Ok(keypair)
    }

    /// Read and parse the private key file
    pub fn load(&self) -> Result<SigningKeypair, KeyError> {
        let path = self.private_key_path();
        let contents = fs::read(&path).map_err(|source| KeyError::Read {
            path: path.display().to_string(),
            source,
        })?;

        parse_private_key(&contents).map(SigningKeypair::from_secret)
    }

    /// Write both key files, creating the directory with owner-only access
    pub fn persist(&self, keypair: &SigningKeypair) -> Result<(), KeyError> {
        create_private_dir(&self.dir)?;
        write_key_file(&self.private_key_path(), keypair.private_key_pem()?.as_bytes())?;
        write_key_file(&self.public_key_path(), keypair.public_key_pem()?.as_bytes())?;
        Ok(())
    }
}

/// PEM-decode a private key and parse it as PKCS#8, falling back to SEC1.
///
/// The PEM label is not trusted: either DER encoding is accepted under any label.
pub fn parse_private_key(contents: &[u8]) -> Result<SecretKey, KeyError> {
    let (_label, der) = pem::decode_vec(contents).map_err(|e| KeyError::Pem(e.to_string()))?;

    SecretKey::from_pkcs8_der(&der)
        .or_else(|_| SecretKey::from_sec1_der(&der))
        .map_err(|e| KeyError::Parse(e.to_string()))
}

fn create_private_dir(dir: &Path) -> Result<(), KeyError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(dir).map_err(|source| KeyError::CreateDir {
        path: dir.display().to_string(),
        source,
    })
}

fn write_key_file(path: &Path, contents: &[u8]) -> Result<(), KeyError> {
    let write_err = |source| KeyError::Write {
        path: path.display().to_string(),
        source,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;

    // mode() only applies on creation; tighten files that already existed
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }

    Ok(())
}
