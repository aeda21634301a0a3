//! Connection bootstrap: gateway URL, login request and login reply.

use std::fmt;

use crate::config::AppConfig;
use crate::wire::proto::{services, DeviceInfo, LoginReply, LoginRequest, PlayerBasic, ReportData};
use crate::wire::session::transport::ConnectTarget;
use crate::wire::session::{CallError, Session};

pub const LOGIN_METHOD: &str = "Login";
const LOGIN_SCENE_ID: &str = "1256";
const REPORT_CHANNEL: &str = "other";
const REPORT_PLATFORM_ID: i32 = 2;

#[derive(Debug)]
pub enum HandshakeError {
    MissingLoginCode,
    Call(CallError),
    MissingPlayer,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLoginCode => write!(f, "login code is empty"),
            Self::Call(source) => write!(f, "login call failed: {source}"),
            Self::MissingPlayer => write!(f, "login reply carried no player record"),
        }
    }
}

impl std::error::Error for HandshakeError {}

impl From<CallError> for HandshakeError {
    fn from(source: CallError) -> Self {
        Self::Call(source)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoginOutcome {
    pub player: PlayerBasic,
    /// Zero when the server did not report its clock.
    pub server_time_ms: i64,
}

/// Builds the gateway URL with the platform, os, version and login code
/// query parameters, plus the headers the gateway expects.
pub fn connect_target(config: &AppConfig) -> Result<ConnectTarget, HandshakeError> {
    let server = &config.server;
    if server.login_code.trim().is_empty() {
        return Err(HandshakeError::MissingLoginCode);
    }

    Ok(ConnectTarget {
        url: format!(
            "{}?platform={}&os={}&ver={}&code={}&openID=",
            server.url,
            server.platform,
            server.os,
            server.client_version,
            server.login_code.trim()
        ),
        user_agent: server.user_agent.clone(),
        origin: server.origin.clone(),
    })
}

pub fn build_login_request(config: &AppConfig) -> LoginRequest {
    LoginRequest {
        sharer_id: 0,
        sharer_open_id: String::new(),
        device_info: Some(DeviceInfo {
            client_version: config.server.client_version.clone(),
            sys_software: config.device.sys_software.clone(),
            network: config.device.network.clone(),
            memory: config.device.memory.clone(),
            device_id: config.device.device_id.clone(),
        }),
        share_cfg_id: 0,
        scene_id: LOGIN_SCENE_ID.to_owned(),
        report_data: Some(ReportData {
            minigame_channel: REPORT_CHANNEL.to_owned(),
            minigame_platid: REPORT_PLATFORM_ID,
        }),
    }
}

/// Sends the login request on an open session and extracts the player record.
pub fn login(session: &Session, request: &LoginRequest) -> Result<LoginOutcome, HandshakeError> {
    let reply: LoginReply = session.call_decoded(services::USER, LOGIN_METHOD, request)?;
    let player = reply.basic.ok_or(HandshakeError::MissingPlayer)?;

    Ok(LoginOutcome {
        player,
        server_time_ms: reply.time_now_millis.max(0),
    })
}
