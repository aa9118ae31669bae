//! SSH connection handling for mock servers.
//!
//! Every authentication attempt succeeds. Session channels may request the
//! `sftp` subsystem, which is served by [`SftpHandler`]; any other
//! subsystem is refused.

use crate::handler::{SftpHandler, SharedFilesystem};
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

/// Per-connection SSH handler.
pub(crate) struct SshSession {
    host: String,
    peer: SocketAddr,
    filesystem: SharedFilesystem,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SshSession {
    pub(crate) fn new(host: String, peer: SocketAddr, filesystem: SharedFilesystem) -> Self {
        Self {
            host,
            peer,
            filesystem,
            channels: HashMap::new(),
        }
    }
}

impl fmt::Debug for SshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("peer", &self.peer)
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl russh::server::Handler for SshSession {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(host = %self.host, user, "accepting auth_none");
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        debug!(host = %self.host, user, "accepting password");
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        debug!(host = %self.host, user, "accepting public key");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let channel = match self.channels.remove(&channel_id) {
            Some(channel) if name == "sftp" => channel,
            other => {
                if let Some(channel) = other {
                    self.channels.insert(channel_id, channel);
                }
                debug!(host = %self.host, subsystem = name, "refusing subsystem");
                session.channel_failure(channel_id)?;
                return Ok(());
            }
        };

        debug!(host = %self.host, peer = %self.peer, "starting sftp subsystem");
        session.channel_success(channel_id)?;
        let handler = SftpHandler::new(self.filesystem.clone());
        russh_sftp::server::run(channel.into_stream(), handler).await;
        Ok(())
    }
}
