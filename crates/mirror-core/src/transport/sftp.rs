//! SFTP session backend built on libssh2

use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::{FileStat, Session, Sftp};

use super::remote::{Connector, RemoteEntry, RemoteSession};
use crate::endpoint::{RemoteAuth, RemoteConfig};
use crate::event::Timestamp;
use crate::{Error, Result};

/// Opens authenticated SFTP sessions for one [`RemoteConfig`].
#[derive(Debug, Clone)]
pub struct SftpConnector {
    config: RemoteConfig,
}

impl SftpConnector {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn connect_error(&self, message: impl ToString) -> Error {
        Error::Connect {
            host: self.config.address(),
            message: message.to_string(),
        }
    }

    fn open_tcp(&self, timeout: Duration) -> Result<TcpStream> {
        let addrs = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_error(e))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(self.connect_error(
            last_error.map_or_else(|| "no address resolved".to_string(), |e| e.to_string()),
        ))
    }

    fn authenticate(&self, session: &Session) -> Result<()> {
        let username = self.config.username.as_str();
        match &self.config.auth {
            RemoteAuth::Agent => session
                .userauth_agent(username)
                .map_err(|e| self.connect_error(e))?,
            RemoteAuth::KeyFile {
                private_key,
                passphrase_env,
            } => {
                let passphrase = passphrase_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok());
                session
                    .userauth_pubkey_file(username, None, private_key, passphrase.as_deref())
                    .map_err(|e| self.connect_error(e))?
            }
            RemoteAuth::PasswordEnv { variable } => {
                let password = std::env::var(variable).map_err(|_| {
                    self.connect_error(format!("password variable {} is not set", variable))
                })?;
                session
                    .userauth_password(username, &password)
                    .map_err(|e| self.connect_error(e))?
            }
        }

        if !session.authenticated() {
            return Err(self.connect_error("authentication was rejected"));
        }
        Ok(())
    }
}

impl Connector for SftpConnector {
    fn address(&self) -> String {
        self.config.address()
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let tcp = self.open_tcp(timeout)?;

        let mut session = Session::new().map_err(|e| self.connect_error(e))?;
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| self.connect_error(e))?;
        self.authenticate(&session)?;

        let sftp = session.sftp().map_err(|e| self.connect_error(e))?;
        Ok(Box::new(SftpSession {
            sftp,
            _session: session,
        }))
    }
}

/// A live SFTP channel. The SSH session is kept alive alongside it.
pub struct SftpSession {
    sftp: Sftp,
    _session: Session,
}

impl RemoteSession for SftpSession {
    fn list(&mut self, dir: &str) -> io::Result<Vec<RemoteEntry>> {
        let entries = self.sftp.readdir(Path::new(dir))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    is_dir: stat.is_dir(),
                    len: stat.size.unwrap_or(0),
                    modified: Timestamp::from_secs(stat.mtime.unwrap_or(0) as f64),
                })
            })
            .collect())
    }

    fn get(&mut self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.sftp.open(Path::new(path))?))
    }

    fn put(&mut self, path: &str, content: &mut dyn Read, mtime: Timestamp) -> io::Result<u64> {
        let mut file = self.sftp.create(Path::new(path))?;
        let bytes = io::copy(content, &mut file)?;
        drop(file);

        // SFTP stores whole seconds.
        let secs = u64::try_from(mtime.whole_seconds()).unwrap_or(0);
        self.sftp.setstat(
            Path::new(path),
            FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: None,
                atime: Some(secs),
                mtime: Some(secs),
            },
        )?;
        Ok(bytes)
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        Ok(self.sftp.unlink(Path::new(path))?)
    }

    fn mkdir(&mut self, path: &str) -> io::Result<()> {
        Ok(self.sftp.mkdir(Path::new(path), 0o755)?)
    }
}
