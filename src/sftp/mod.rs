//! SFTP sessions over SSH
//!
//! Supports password, private-key, or both. Host keys can be pinned with a
//! SHA256 fingerprint; without one the server key is accepted and a warning
//! is logged.

use crate::config::{SftpAuthType, SftpConfig};
use crate::error::{FactoryError, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Credentials selected for one SFTP login
#[derive(Debug, Clone)]
pub enum SftpCredentials {
    Password(SecretString),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
    /// Key first, then password if the server asks for more
    PasswordAndKey {
        password: SecretString,
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

impl SftpCredentials {
    /// Pick the credentials for the configured auth type.
    ///
    /// A missing credential for that type is a `Config` error. `~` in the key
    /// path is expanded.
    pub fn from_config(config: &SftpConfig) -> Result<Self> {
        Self::from_config_expanding(config, |path| {
            PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
        })
    }

    fn from_config_expanding(config: &SftpConfig, expand: impl Fn(&Path) -> PathBuf) -> Result<Self> {
        let password = || {
            config
                .password
                .clone()
                .filter(|p| !p.expose_secret().is_empty())
                .ok_or_else(|| {
                    FactoryError::config(format!(
                        "SFTP auth type {:?} requires a password",
                        config.auth_type
                    ))
                })
        };
        let key_path = || {
            config
                .private_key_path
                .as_ref()
                .map(|p| expand(p.as_path()))
                .ok_or_else(|| {
                    FactoryError::config(format!(
                        "SFTP auth type {:?} requires private_key_path",
                        config.auth_type
                    ))
                })
        };
        let passphrase = config
            .private_key_passphrase
            .clone()
            .filter(|p| !p.expose_secret().is_empty());

        Ok(match config.auth_type {
            SftpAuthType::Password => SftpCredentials::Password(password()?),
            SftpAuthType::PrivateKey => SftpCredentials::PrivateKey {
                path: key_path()?,
                passphrase,
            },
            SftpAuthType::PasswordAndKey => SftpCredentials::PasswordAndKey {
                password: password()?,
                path: key_path()?,
                passphrase,
            },
        })
    }
}

/// Normalize a configured fingerprint: `SHA256:` prefix and padding are optional
pub fn normalize_fingerprint(fingerprint: &str) -> &str {
    let fingerprint = fingerprint.trim();
    fingerprint
        .strip_prefix("SHA256:")
        .unwrap_or(fingerprint)
        .trim_end_matches('=')
}

#[cfg(feature = "sftp")]
mod session {
    use super::{normalize_fingerprint, SftpCredentials};
    use crate::config::SftpConfig;
    use crate::error::{FactoryError, Result};
    use async_trait::async_trait;
    use russh::client;
    use russh_keys::key;
    use russh_sftp::client::SftpSession;
    use secrecy::{ExposeSecret, SecretString};
    use std::ops::Deref;
    use std::path::Path;
    use std::sync::Arc;
    use tracing::{info, warn};

    /// Checks the server key against an optional pinned fingerprint
    pub struct HostKeyCheck {
        host: String,
        port: u16,
        expected: Option<String>,
    }

    #[async_trait]
    impl client::Handler for HostKeyCheck {
        type Error = russh::Error;

        async fn check_server_key(
            &mut self,
            server_public_key: &key::PublicKey,
        ) -> std::result::Result<bool, Self::Error> {
            let actual = server_public_key.fingerprint();
            match &self.expected {
                Some(expected) => {
                    let matches = normalize_fingerprint(expected) == normalize_fingerprint(&actual);
                    if !matches {
                        tracing::error!(
                            "SFTP host key mismatch for {}:{} (expected SHA256:{}, got SHA256:{})",
                            self.host,
                            self.port,
                            normalize_fingerprint(expected),
                            actual
                        );
                    }
                    Ok(matches)
                }
                None => {
                    warn!(
                        "SFTP host key for {}:{} is not pinned, accepting SHA256:{}",
                        self.host, self.port, actual
                    );
                    Ok(true)
                }
            }
        }
    }

    /// Open SFTP session plus the SSH connection carrying it
    pub struct SftpClient {
        sftp: SftpSession,
        handle: client::Handle<HostKeyCheck>,
    }

    impl SftpClient {
        /// The SSH connection handle, for opening further channels
        pub fn ssh(&self) -> &client::Handle<HostKeyCheck> {
            &self.handle
        }

        /// Close the SFTP session and disconnect
        pub async fn close(self) -> Result<()> {
            self.sftp
                .close()
                .await
                .map_err(|e| FactoryError::driver("sftp", e))?;
            self.handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(|e| FactoryError::driver("sftp", e))?;
            Ok(())
        }
    }

    impl Deref for SftpClient {
        type Target = SftpSession;

        fn deref(&self) -> &SftpSession {
            &self.sftp
        }
    }

    fn load_key(path: &Path, passphrase: Option<&SecretString>) -> Result<Arc<key::KeyPair>> {
        let passphrase = passphrase.map(|p| p.expose_secret().as_str());
        russh_keys::load_secret_key(path, passphrase)
            .map(Arc::new)
            .map_err(|e| {
                FactoryError::config(format!(
                    "Failed to load private key {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    pub(super) async fn open(config: &SftpConfig, credentials: SftpCredentials) -> Result<SftpClient> {
        let ssh_config = Arc::new(client::Config::default());
        let handler = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            expected: config.host_key_fingerprint.clone(),
        };

        let mut handle = client::connect(ssh_config, (config.host.as_str(), config.port), handler)
            .await
            .map_err(|e| {
                FactoryError::transport(format!(
                    "SSH connection to {}:{} failed: {}",
                    config.host, config.port, e
                ))
            })?;

        let username = config.username.as_str();
        let auth_error = |e: russh::Error| FactoryError::transport(format!("SSH authentication error: {}", e));

        let authenticated = match credentials {
            SftpCredentials::Password(password) => handle
                .authenticate_password(username, password.expose_secret())
                .await
                .map_err(auth_error)?,
            SftpCredentials::PrivateKey { path, passphrase } => {
                let key = load_key(&path, passphrase.as_ref())?;
                handle
                    .authenticate_publickey(username, key)
                    .await
                    .map_err(auth_error)?
            }
            SftpCredentials::PasswordAndKey {
                password,
                path,
                passphrase,
            } => {
                let key = load_key(&path, passphrase.as_ref())?;
                handle
                    .authenticate_publickey(username, key)
                    .await
                    .map_err(auth_error)?
                    || handle
                        .authenticate_password(username, password.expose_secret())
                        .await
                        .map_err(auth_error)?
            }
        };

        if !authenticated {
            return Err(FactoryError::transport(format!(
                "SSH authentication rejected for {}@{}:{}",
                username, config.host, config.port
            )));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FactoryError::transport(format!("SSH channel open failed: {}", e)))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FactoryError::transport(format!("SFTP subsystem request failed: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FactoryError::driver("sftp", e))?;

        info!("SFTP session established with {}:{}", config.host, config.port);
        Ok(SftpClient { sftp, handle })
    }
}

#[cfg(feature = "sftp")]
pub use session::{HostKeyCheck, SftpClient};

/// Uninhabited stand-in for builds without the `sftp` feature
#[cfg(not(feature = "sftp"))]
pub enum SftpClient {}

/// Connect, authenticate and open the `sftp` subsystem.
///
/// A missing credential for the chosen auth type is a `Config` error; a
/// rejected login is a `Transport` error. The caller owns the session and
/// should [`SftpClient::close`] it when done.
pub async fn create_sftp_client(config: &SftpConfig) -> Result<SftpClient> {
    debug!(
        host = %config.host,
        port = config.port,
        auth_type = ?config.auth_type,
        "Creating SFTP client"
    );

    config.validate()?;
    let credentials = SftpCredentials::from_config(config)?;
    crate::drivers::Driver::Sftp.require()?;

    #[cfg(feature = "sftp")]
    {
        session::open(config, credentials).await
    }
    #[cfg(not(feature = "sftp"))]
    {
        drop(credentials);
        Err(crate::drivers::Driver::Sftp.missing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_type: SftpAuthType) -> SftpConfig {
        let mut config = SftpConfig::new("sftp.example.com", "u");
        config.auth_type = auth_type;
        config
    }

    #[test]
    fn test_password_mode_requires_password() {
        let err = SftpCredentials::from_config(&config(SftpAuthType::Password)).unwrap_err();
        assert!(matches!(err, FactoryError::Config { .. }));

        let mut cfg = config(SftpAuthType::Password);
        cfg.password = Some(SecretString::new("p".to_string()));
        assert!(matches!(
            SftpCredentials::from_config(&cfg).unwrap(),
            SftpCredentials::Password(_)
        ));
    }

    #[test]
    fn test_key_modes_require_key_path() {
        let mut cfg = config(SftpAuthType::PrivateKey);
        assert!(SftpCredentials::from_config(&cfg).is_err());

        cfg.private_key_path = Some(PathBuf::from("/keys/id_ed25519"));
        match SftpCredentials::from_config(&cfg).unwrap() {
            SftpCredentials::PrivateKey { path, passphrase } => {
                assert_eq!(path, PathBuf::from("/keys/id_ed25519"));
                assert!(passphrase.is_none());
            }
            other => panic!("unexpected credentials: {:?}", other),
        }

        cfg.auth_type = SftpAuthType::PasswordAndKey;
        let err = SftpCredentials::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("requires a password"));
    }

    fn expand_in_home(path: &Path) -> PathBuf {
        PathBuf::from(shellexpand::tilde_with_context(&path.to_string_lossy(), || Some("/home/etl")).into_owned())
    }

    #[test]
    fn test_key_path_expands_home() {
        let mut cfg = config(SftpAuthType::PrivateKey);
        cfg.private_key_path = Some(PathBuf::from("~/.ssh/id_rsa"));
        match SftpCredentials::from_config_expanding(&cfg, expand_in_home).unwrap() {
            SftpCredentials::PrivateKey { path, .. } => {
                assert_eq!(path, PathBuf::from("/home/etl/.ssh/id_rsa"));
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(normalize_fingerprint("SHA256:abc+def="), "abc+def");
        assert_eq!(normalize_fingerprint(" abc+def "), "abc+def");
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_connecting() {
        let err = create_sftp_client(&config(SftpAuthType::Password))
            .await
            .err()
            .expect("no password configured");
        assert!(matches!(err, FactoryError::Config { .. }));
    }
}
