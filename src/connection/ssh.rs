//! SSH transport built on russh.
//!
//! Each managed host gets its own session, authenticated from the host
//! record's connection variables (key first, then password). The gateway
//! connects to hosts whose keys it has never seen, so host keys are accepted
//! unconditionally.

use async_trait::async_trait;
use russh::client::{Handle, Handler};
use russh::keys::key::PublicKey;
use russh_keys::load_secret_key;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::{
    build_command, CommandResult, Connection, ConnectionError, ConnectionFactory,
    ConnectionResult, ExecuteOptions, RusshError,
};
use crate::config::EngineConfig;
use crate::inventory::HostRecord;

/// Client handler that accepts any server key.
///
/// Host key checking is disabled for gateway-managed hosts; the inventory
/// records carry `ansible_ssh_host_key_checking: false` for the same reason.
struct ClientHandler {
    host: String,
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = RusshError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        trace!(host = %self.host, "accepting server host key");
        Ok(true)
    }
}

/// SSH connection to a single managed host.
pub struct SshConnection {
    /// user@host:port
    identifier: String,
    /// Read lock for channel operations, write lock only for close().
    handle: Arc<RwLock<Option<Handle<ClientHandler>>>>,
}

impl SshConnection {
    /// Connect and authenticate using the host record's variables, falling
    /// back to the engine defaults for user and key file.
    pub async fn connect(host: &HostRecord, config: &EngineConfig) -> ConnectionResult<Self> {
        let address = host.address();
        let user = host
            .user()
            .unwrap_or(&config.remote_user)
            .to_string();
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        debug!(host = %address, port = %host.port, user = %user, "connecting via SSH");

        let ssh_config = Arc::new(russh::client::Config {
            inactivity_timeout: Some(timeout),
            ..Default::default()
        });

        let addr = format!("{}:{}", address, host.port);
        let socket = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout.as_secs()))?
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("failed to connect to {}: {}", addr, e))
            })?;

        socket.set_nodelay(true).map_err(|e| {
            ConnectionError::ConnectionFailed(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        let handler = ClientHandler {
            host: address.to_string(),
        };
        let mut session = russh::client::connect_stream(ssh_config, socket, handler)
            .await
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("SSH handshake failed: {}", e))
            })?;

        Self::authenticate(&mut session, &user, host, config).await?;

        Ok(Self {
            identifier: format!("{}@{}:{}", user, address, host.port),
            handle: Arc::new(RwLock::new(Some(session))),
        })
    }

    /// Key auth first (record var, then engine default), then password.
    async fn authenticate(
        session: &mut Handle<ClientHandler>,
        user: &str,
        host: &HostRecord,
        config: &EngineConfig,
    ) -> ConnectionResult<()> {
        let key_file = host
            .private_key_file()
            .map(str::to_string)
            .or_else(|| config.private_key_file.clone());

        if let Some(key_file) = key_file {
            let key_path = Path::new(&key_file);
            match Self::try_key_auth(session, user, key_path).await {
                Ok(()) => {
                    debug!(key = %key_path.display(), "authenticated using key");
                    return Ok(());
                }
                Err(e) => {
                    debug!(key = %key_path.display(), error = %e, "key authentication failed");
                }
            }
        }

        if let Some(password) = host.password() {
            let authenticated = session
                .authenticate_password(user, password)
                .await
                .map_err(|e| {
                    ConnectionError::AuthenticationFailed(format!(
                        "password authentication failed: {}",
                        e
                    ))
                })?;

            if authenticated {
                debug!("authenticated using password");
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed(
            "all authentication methods failed".to_string(),
        ))
    }

    async fn try_key_auth(
        session: &mut Handle<ClientHandler>,
        user: &str,
        key_path: &Path,
    ) -> ConnectionResult<()> {
        if !key_path.exists() {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "key file not found: {}",
                key_path.display()
            )));
        }

        let key_pair = load_secret_key(key_path, None).map_err(|e| {
            ConnectionError::AuthenticationFailed(format!(
                "failed to load key {}: {}",
                key_path.display(),
                e
            ))
        })?;

        let authenticated = session
            .authenticate_publickey(user, Arc::new(key_pair))
            .await
            .map_err(|e| {
                ConnectionError::AuthenticationFailed(format!(
                    "key authentication failed for {}: {}",
                    key_path.display(),
                    e
                ))
            })?;

        if authenticated {
            Ok(())
        } else {
            Err(ConnectionError::AuthenticationFailed(
                "key rejected".to_string(),
            ))
        }
    }

    async fn open_sftp(handle: &Handle<ClientHandler>) -> ConnectionResult<SftpSession> {
        let channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to open channel: {}", e))
        })?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to request SFTP subsystem: {}", e))
        })?;

        SftpSession::new(channel.into_stream()).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to create SFTP session: {}", e))
        })
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let options = options.unwrap_or_default();
        // russh has no request_env, so env vars ride along in the command.
        let full_command = build_command(command, &options);

        trace!(command = %full_command, "executing remote command");

        let execute_future = async {
            let handle_guard = self.handle.read().await;
            let handle = handle_guard.as_ref().ok_or(ConnectionError::ConnectionClosed)?;

            let mut channel = handle.channel_open_session().await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("failed to open channel: {}", e))
            })?;
            drop(handle_guard);

            channel.exec(true, full_command).await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("failed to execute command: {}", e))
            })?;

            // sudo -S reads the password from stdin
            if options.escalate {
                if let Some(password) = &options.escalate_password {
                    let password_data = format!("{}\n", password);
                    let mut cursor = tokio::io::BufReader::new(password_data.as_bytes());
                    channel.data(&mut cursor).await.map_err(|e| {
                        ConnectionError::ExecutionFailed(format!(
                            "failed to write escalation password: {}",
                            e
                        ))
                    })?;
                }
            }

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut exit_code = None;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => {
                        stdout.extend_from_slice(data);
                    }
                    ChannelMsg::ExtendedData { ref data, ext } => {
                        // Extended data type 1 is stderr
                        if ext == 1 {
                            stderr.extend_from_slice(data);
                        }
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        exit_code = Some(exit_status);
                    }
                    ChannelMsg::Eof => {}
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }

            let _ = channel.eof().await;

            let exit_code: i32 = exit_code.map(|e| e as i32).unwrap_or(i32::MAX);
            let stdout_str = String::from_utf8_lossy(&stdout).to_string();
            let stderr_str = String::from_utf8_lossy(&stderr).to_string();

            trace!(exit_code = %exit_code, "command completed");

            if exit_code == 0 {
                Ok(CommandResult::success(stdout_str, stderr_str))
            } else {
                Ok(CommandResult::failure(exit_code, stdout_str, stderr_str))
            }
        };

        if let Some(timeout_secs) = options.timeout {
            match tokio::time::timeout(Duration::from_secs(timeout_secs), execute_future).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(timeout_secs)),
            }
        } else {
            execute_future.await
        }
    }

    async fn upload_content(
        &self,
        content: &[u8],
        remote_path: &Path,
    ) -> ConnectionResult<()> {
        debug!(remote = %remote_path.display(), size = %content.len(), "uploading content via SFTP");

        let handle_guard = self.handle.read().await;
        let handle = handle_guard.as_ref().ok_or(ConnectionError::ConnectionClosed)?;
        let sftp = Self::open_sftp(handle).await?;
        drop(handle_guard);

        let remote_path_str = remote_path.to_string_lossy().to_string();
        let mut remote_file = sftp.create(&remote_path_str).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "failed to create remote file {}: {}",
                remote_path.display(),
                e
            ))
        })?;

        remote_file.write_all(content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to write remote file: {}", e))
        })?;

        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        let handle = {
            let mut handle_guard = self.handle.write().await;
            handle_guard.take()
        };

        if let Some(handle) = handle {
            let _ = handle
                .disconnect(
                    russh::Disconnect::ByApplication,
                    "connection closed by client",
                    "en",
                )
                .await;
        }

        Ok(())
    }
}

/// The default factory: SSH for every host.
#[derive(Debug, Default, Clone)]
pub struct SshConnectionFactory;

#[async_trait]
impl ConnectionFactory for SshConnectionFactory {
    async fn connect(
        &self,
        host: &HostRecord,
        config: &EngineConfig,
    ) -> ConnectionResult<Arc<dyn Connection>> {
        match SshConnection::connect(host, config).await {
            Ok(conn) => Ok(Arc::new(conn)),
            Err(e) => {
                warn!(host = %host.name, error = %e, "connection failed");
                Err(e)
            }
        }
    }
}
