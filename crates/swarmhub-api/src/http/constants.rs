//! Shared HTTP constants (headers, routes, socket defaults).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_USER: &str = "x-swarmhub-user";
pub(crate) const HEADER_SESSION: &str = "x-swarmhub-session";
pub(crate) const HEADER_ADMIN: &str = "x-swarmhub-admin";

pub(crate) const ROUTE_SOCKET: &str = "/api/socket";

pub(crate) const FRAME_TORRENT_LIST: &str = "torrentlist";
pub(crate) const FRAME_TORRENT_STREAM: &str = "torrentstream";

pub(crate) const DEFAULT_STREAM_INTERVAL_SECS: u64 = 5;
pub(crate) const MAX_STREAM_INTERVAL_SECS: u64 = 300;

pub(crate) const MSG_SPEC_ADDED: &str = "Torrent Spec Added";
