//! Inbound socket commands.
//!
//! Each text frame is one JSON object tagged by `command`. Results that
//! concern the user's transfers are broadcast by the workflow to every
//! session of the user; failures answer only the requesting session with the
//! error frame.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use swarmhub_hub::{DataMsg, Notification, SessionConnection};
use swarmhub_torrent_core::{
    InfoHash, TorrentSpec, spec_from_base64, spec_from_magnet, spec_from_path, spec_from_url,
};
use tracing::{debug, info};

use crate::http::constants::{
    DEFAULT_STREAM_INTERVAL_SECS, FRAME_TORRENT_LIST, FRAME_TORRENT_STREAM,
    MAX_STREAM_INTERVAL_SECS,
};
use crate::http::errors::ApiError;
use crate::state::ApiState;

const fn default_interval() -> u64 {
    DEFAULT_STREAM_INTERVAL_SECS
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub(crate) enum SocketCommand {
    ListTorrents,
    StreamTorrents {
        /// Seconds between snapshots.
        #[serde(default = "default_interval")]
        interval: u64,
    },
    StopStream,
    AddMagnet {
        uri: String,
        #[serde(default, alias = "autoStart")]
        autostart: bool,
        #[serde(default, alias = "noTrackers")]
        notrackers: bool,
    },
    /// Base64 encoded `.torrent` document.
    AddTorrent {
        data: String,
        #[serde(default, alias = "autoStart")]
        autostart: bool,
        #[serde(default, alias = "noTrackers")]
        notrackers: bool,
    },
    /// `.torrent` document downloaded over HTTP(S).
    AddUrl {
        url: String,
        #[serde(default, alias = "autoStart")]
        autostart: bool,
        #[serde(default, alias = "noTrackers")]
        notrackers: bool,
    },
    /// `.torrent` file on the server's filesystem; admin only.
    AddFile {
        path: String,
        #[serde(default, alias = "autoStart")]
        autostart: bool,
        #[serde(default, alias = "noTrackers")]
        notrackers: bool,
    },
    StartTorrent {
        hash: String,
    },
    StopTorrent {
        hash: String,
    },
    RemoveTorrent {
        hash: String,
    },
    DeleteTorrent {
        hash: String,
    },
    ListConns,
    KickUser {
        username: String,
    },
}

/// Parse and execute one inbound frame for `session`.
pub(crate) async fn handle_frame(
    state: &Arc<ApiState>,
    session: &Arc<SessionConnection>,
    frame: &str,
) {
    let command = match serde_json::from_str::<SocketCommand>(frame) {
        Ok(command) => command,
        Err(err) => {
            debug!(user = %session.username(), error = %err, "unparseable socket command");
            reply(session, &Notification::error("invalid command")).await;
            return;
        }
    };
    if let Err(err) = dispatch(state, session, command).await {
        reply(session, &Notification::error(err.message())).await;
    }
}

async fn dispatch(
    state: &Arc<ApiState>,
    session: &Arc<SessionConnection>,
    command: SocketCommand,
) -> Result<(), ApiError> {
    let user = session.username();
    match command {
        SocketCommand::ListTorrents => {
            let torrents = state.workflow.list(user).await?;
            deliver(session, &DataMsg::new(FRAME_TORRENT_LIST, torrents)).await;
        }
        SocketCommand::StreamTorrents { interval } => {
            start_stream(state, session, interval).await;
        }
        SocketCommand::StopStream => {
            let outcome = session.stop_stream().await;
            debug!(user = %user, outcome = ?outcome, "torrent stream stop requested");
        }
        SocketCommand::AddMagnet {
            uri,
            autostart,
            notrackers,
        } => {
            add_spec(state, user, spec_from_magnet(&uri)?, autostart, notrackers).await?;
        }
        SocketCommand::AddTorrent {
            data,
            autostart,
            notrackers,
        } => {
            add_spec(state, user, spec_from_base64(&data)?, autostart, notrackers).await?;
        }
        SocketCommand::AddUrl {
            url,
            autostart,
            notrackers,
        } => {
            let client = state
                .spec_client
                .as_ref()
                .ok_or_else(|| ApiError::bad_request("url sources are disabled"))?;
            let spec = spec_from_url(client, &url).await?;
            add_spec(state, user, spec, autostart, notrackers).await?;
        }
        SocketCommand::AddFile {
            path,
            autostart,
            notrackers,
        } => {
            require_admin(session)?;
            let spec = spec_from_path(&path).await?;
            add_spec(state, user, spec, autostart, notrackers).await?;
        }
        SocketCommand::StartTorrent { hash } => {
            state.workflow.start(user, InfoHash::from_hex(&hash)?).await?;
        }
        SocketCommand::StopTorrent { hash } => {
            state.workflow.stop(user, InfoHash::from_hex(&hash)?).await?;
        }
        SocketCommand::RemoveTorrent { hash } => {
            state.workflow.remove(user, InfoHash::from_hex(&hash)?).await?;
        }
        SocketCommand::DeleteTorrent { hash } => {
            state.workflow.delete(user, InfoHash::from_hex(&hash)?).await?;
        }
        SocketCommand::ListConns => {
            require_admin(session)?;
            let frame = state
                .registry
                .list_users_frame()
                .map_err(|err| ApiError::internal(err.to_string()))?;
            if let Err(err) = session.send(&frame).await {
                debug!(user = %user, error = %err, "connection listing not delivered");
            }
        }
        SocketCommand::KickUser { username } => {
            require_admin(session)?;
            let closed = state.registry.remove_user(&username).await;
            info!(admin = %user, target = %username, closed, "user sessions closed by admin");
            reply(
                session,
                &Notification::success(format!("closed {closed} sessions of {username}")),
            )
            .await;
        }
    }
    Ok(())
}

async fn add_spec(
    state: &ApiState,
    user: &str,
    mut spec: TorrentSpec,
    autostart: bool,
    notrackers: bool,
) -> Result<(), ApiError> {
    if notrackers {
        spec.strip_trackers();
    }
    let hash = state.workflow.add_spec(user, spec, autostart).await?;
    debug!(user = %user, hash = %hash, autostart, notrackers, "spec added over socket");
    Ok(())
}

fn require_admin(session: &SessionConnection) -> Result<(), ApiError> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin access required"))
    }
}

/// Replace the session's stream with a periodic snapshot of its transfers.
async fn start_stream(state: &Arc<ApiState>, session: &Arc<SessionConnection>, interval: u64) {
    let period = Duration::from_secs(interval.clamp(1, MAX_STREAM_INTERVAL_SECS));
    let guard = session.begin_stream().await;
    let state = Arc::clone(state);
    let session = Arc::clone(session);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = guard.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if guard.is_stopped() || !session.is_active() {
                break;
            }
            match state.workflow.list(session.username()).await {
                Ok(torrents) => {
                    let frame = DataMsg::new(FRAME_TORRENT_STREAM, torrents);
                    if session.send_frame(&frame).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    reply(&session, &Notification::error(err.to_string())).await;
                    break;
                }
            }
        }
        debug!(user = %session.username(), session_id = %session.id(), "torrent stream ended");
        drop(guard);
    });
}

async fn deliver<T: serde::Serialize>(session: &SessionConnection, frame: &DataMsg<T>) {
    if let Err(err) = session.send_frame(frame).await {
        debug!(user = %session.username(), error = %err, "socket frame not delivered");
    }
}

async fn reply(session: &SessionConnection, notification: &Notification) {
    if let Err(err) = session.send_notification(notification).await {
        debug!(user = %session.username(), error = %err, "socket reply not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{HASH_A, StubWorkflow, connect, state_with, torrent_bytes};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use swarmhub_hub::StreamStop;

    fn errors(frames: &[Notification]) -> Vec<String> {
        frames
            .iter()
            .filter(|frame| frame.state == "error")
            .map(|frame| frame.msg.clone())
            .collect()
    }

    #[test]
    fn commands_parse_from_tagged_json() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::from_str::<SocketCommand>(r#"{"command":"streamtorrents"}"#)?,
            SocketCommand::StreamTorrents { interval: 5 }
        );
        assert_eq!(
            serde_json::from_str::<SocketCommand>(
                r#"{"command":"addmagnet","uri":"magnet:?x","autoStart":true}"#
            )?,
            SocketCommand::AddMagnet {
                uri: "magnet:?x".into(),
                autostart: true,
                notrackers: false,
            }
        );
        assert_eq!(
            serde_json::from_str::<SocketCommand>(
                r#"{"command":"addtorrent","data":"ZA==","noTrackers":true}"#
            )?,
            SocketCommand::AddTorrent {
                data: "ZA==".into(),
                autostart: false,
                notrackers: true,
            }
        );
        assert!(serde_json::from_str::<SocketCommand>(r#"{"command":"reboot"}"#).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_frames_and_unknown_hashes_answer_with_error_frame() {
        let state = Arc::new(state_with(StubWorkflow::default()));
        let (session, transport) = connect(&state, "alice", "T1", false).await;

        handle_frame(&state, &session, "not json").await;
        handle_frame(&state, &session, r#"{"command":"removetorrent","hash":"zz"}"#).await;
        handle_frame(
            &state,
            &session,
            &format!(r#"{{"command":"removetorrent","hash":"{HASH_A}"}}"#),
        )
        .await;

        assert_eq!(
            errors(&transport.notifications()),
            vec![
                "invalid command".to_string(),
                "error parsing string to InfoHash".to_string(),
                "torrent not found".to_string(),
            ]
        );
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn list_torrents_answers_with_user_transfers() -> Result<(), Box<dyn std::error::Error>> {
        let workflow = StubWorkflow::default();
        workflow.seed("alice", HASH_A)?;
        let state = Arc::new(state_with(workflow));
        let (session, transport) = connect(&state, "alice", "T1", false).await;

        handle_frame(&state, &session, r#"{"command":"listtorrents"}"#).await;

        let frames = transport.frames();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0])?;
        assert_eq!(value["type"], "torrentlist");
        assert_eq!(value["data"][0]["infohash"], HASH_A);
        Ok(())
    }

    #[tokio::test]
    async fn admin_commands_require_admin_sessions() -> Result<(), Box<dyn std::error::Error>> {
        let state = Arc::new(state_with(StubWorkflow::default()));
        let (user_session, user_transport) = connect(&state, "bob", "B1", false).await;
        let (admin_session, admin_transport) = connect(&state, "root", "R1", true).await;

        handle_frame(&state, &user_session, r#"{"command":"listconns"}"#).await;
        assert_eq!(
            errors(&user_transport.notifications()),
            vec!["admin access required".to_string()]
        );

        handle_frame(&state, &admin_session, r#"{"command":"listconns"}"#).await;
        let frames = admin_transport.frames();
        let listing: serde_json::Value = serde_json::from_str(&frames[0])?;
        assert_eq!(listing["type"], "userconn");
        assert_eq!(listing["data"].as_array().map(Vec::len), Some(2));

        handle_frame(&state, &admin_session, r#"{"command":"kickuser","username":"bob"}"#).await;
        assert!(!user_session.is_active());
        assert_eq!(user_transport.close_count(), 1);
        assert!(state.registry.get("bob").is_none());
        let last = admin_transport.notifications().pop().ok_or("no reply")?;
        assert_eq!(last.msg, "closed 1 sessions of bob");
        Ok(())
    }

    #[tokio::test]
    async fn stream_runs_until_stopped() -> Result<(), Box<dyn std::error::Error>> {
        let workflow = StubWorkflow::default();
        workflow.seed("alice", HASH_A)?;
        let state = Arc::new(state_with(workflow));
        let (session, transport) = connect(&state, "alice", "T1", false).await;

        handle_frame(&state, &session, r#"{"command":"streamtorrents","interval":1}"#).await;
        for _ in 0..100 {
            if !transport.frames().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let first: serde_json::Value = serde_json::from_str(
            transport.frames().first().ok_or("stream produced nothing")?,
        )?;
        assert_eq!(first["type"], "torrentstream");

        assert_eq!(session.stop_stream().await, StreamStop::Acknowledged);
        assert_eq!(session.stop_stream().await, StreamStop::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn add_torrent_strips_trackers_on_request() -> Result<(), Box<dyn std::error::Error>> {
        let workflow = Arc::new(StubWorkflow::default());
        let state = Arc::new(state_with(Arc::clone(&workflow)));
        let (session, transport) = connect(&state, "alice", "T1", false).await;
        let data = STANDARD.encode(torrent_bytes());

        handle_frame(
            &state,
            &session,
            &format!(r#"{{"command":"addtorrent","data":"{data}","autostart":true}}"#),
        )
        .await;
        handle_frame(
            &state,
            &session,
            &format!(r#"{{"command":"addtorrent","data":"{data}","notrackers":true}}"#),
        )
        .await;

        assert!(errors(&transport.notifications()).is_empty());
        let specs = workflow.added_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].trackers, vec![vec!["udp://tracker.test".to_string()]]);
        assert!(specs[1].trackers.is_empty());
        assert_eq!(specs[1].name(), "a.txt");
        let listed = state.workflow.list("alice").await?;
        assert_eq!(listed.len(), 2);
        assert!(listed[0].state.is_running());
        assert!(!listed[1].state.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_torrents_answer_with_error_frame() {
        let workflow = Arc::new(StubWorkflow::default());
        let state = Arc::new(state_with(Arc::clone(&workflow)));
        let (session, transport) = connect(&state, "alice", "T1", false).await;
        let truncated = STANDARD.encode(b"d4:infod4:name");

        handle_frame(
            &state,
            &session,
            &format!(r#"{{"command":"addtorrent","data":"{truncated}"}}"#),
        )
        .await;
        handle_frame(&state, &session, r#"{"command":"addtorrent","data":"***"}"#).await;

        assert_eq!(
            errors(&transport.notifications()),
            vec![
                "invalid torrent metainfo".to_string(),
                "invalid base64 torrent".to_string(),
            ]
        );
        assert!(workflow.added_specs().is_empty());
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn add_url_downloads_the_torrent() -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let body = torrent_bytes();
        let source = axum::Router::new().route(
            "/a.torrent",
            axum::routing::get(move || {
                let body = body.clone();
                async move { body }
            }),
        );
        let server = tokio::spawn(async move { axum::serve(listener, source).await });

        let workflow = Arc::new(StubWorkflow::default());
        let state = Arc::new(
            state_with(Arc::clone(&workflow)).with_spec_client(reqwest::Client::new()),
        );
        let (session, transport) = connect(&state, "alice", "T1", false).await;

        handle_frame(
            &state,
            &session,
            &format!(r#"{{"command":"addurl","url":"http://{addr}/a.torrent"}}"#),
        )
        .await;
        handle_frame(
            &state,
            &session,
            &format!(r#"{{"command":"addurl","url":"http://{addr}/missing.torrent"}}"#),
        )
        .await;

        assert_eq!(
            errors(&transport.notifications()),
            vec!["torrent download failed".to_string()]
        );
        let specs = workflow.added_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name(), "a.txt");
        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn add_url_without_client_is_rejected() {
        let state = Arc::new(state_with(StubWorkflow::default()));
        let (session, transport) = connect(&state, "alice", "T1", false).await;

        handle_frame(
            &state,
            &session,
            r#"{"command":"addurl","url":"http://127.0.0.1:1/a.torrent"}"#,
        )
        .await;

        assert_eq!(
            errors(&transport.notifications()),
            vec!["url sources are disabled".to_string()]
        );
    }

    #[tokio::test]
    async fn add_file_is_admin_only() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a.torrent");
        tokio::fs::write(&file, torrent_bytes()).await?;
        let frame = serde_json::json!({
            "command": "addfile",
            "path": file.to_string_lossy(),
        })
        .to_string();

        let workflow = Arc::new(StubWorkflow::default());
        let state = Arc::new(state_with(Arc::clone(&workflow)));
        let (user_session, user_transport) = connect(&state, "bob", "B1", false).await;
        let (admin_session, admin_transport) = connect(&state, "root", "R1", true).await;

        handle_frame(&state, &user_session, &frame).await;
        handle_frame(&state, &admin_session, &frame).await;
        handle_frame(
            &state,
            &admin_session,
            &serde_json::json!({
                "command": "addfile",
                "path": dir.path().join("absent.torrent").to_string_lossy(),
            })
            .to_string(),
        )
        .await;

        assert_eq!(
            errors(&user_transport.notifications()),
            vec!["admin access required".to_string()]
        );
        assert_eq!(
            errors(&admin_transport.notifications()),
            vec!["file doesn't exist".to_string()]
        );
        assert_eq!(state.workflow.list("root").await?.len(), 1);
        assert_eq!(workflow.added_specs().len(), 1);
        Ok(())
    }
}
