//! One-shot build request exchange.
//!
//! # Responsibility
//! - Gather a route's coordinates and typed criteria from one read snapshot.
//! - Publish the request with a fresh correlation id and an exclusive reply
//!   channel, wait for one reply, and store it as the route's `details`.
//!
//! # Invariants
//! - The reply channel is provisioned before publishing and torn down on
//!   every exit path.
//! - At most one reply is consumed per request.
//! - `details` is written only after a reply that is a JSON object.

use crate::build::transport::{
    BrokerTransport, InboundMessage, OutboundMessage, ReplyChannel, TransportError,
    ROUTE_UUID_HEADER,
};
use crate::codec::cast_value;
use crate::config::BrokerConfig;
use crate::model::criterion::POINTS_COORDINATES_KEY;
use crate::model::route::{AuthorId, RouteDetail, RouteId};
use crate::repo::route_repo::{load_route_detail, RouteRepository, SqliteRouteRepository};
use crate::repo::{EntityRef, RepoError};
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

const REPLY_CHANNEL_PREFIX: &str = "build-reply";

/// Lifecycle states of one build exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Publishing,
    AwaitingReply,
    Applied,
    TimedOut,
    Failed,
}

impl BuildState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Publishing => "publishing",
            Self::AwaitingReply => "awaiting_reply",
            Self::Applied => "applied",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::TimedOut | Self::Failed)
    }
}

#[derive(Debug)]
pub enum BuildError {
    /// Route absent or not owned by the caller.
    NotFound(RouteId),
    /// No reply within the bound. Retrying starts a new exchange.
    Timeout {
        correlation_id: Uuid,
        waited: Duration,
    },
    /// Provisioning, publishing or waiting failed at the broker.
    Transport(TransportError),
    /// Reply body is not a JSON object.
    InvalidReply(String),
    Repo(RepoError),
}

impl BuildError {
    /// Terminal lifecycle state this error ends in.
    pub fn state(&self) -> BuildState {
        match self {
            Self::Timeout { .. } => BuildState::TimedOut,
            _ => BuildState::Failed,
        }
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "route {id} not found"),
            Self::Timeout {
                correlation_id,
                waited,
            } => write!(
                f,
                "no build reply for {correlation_id} within {} ms",
                waited.as_millis()
            ),
            Self::Transport(err) => write!(f, "{err}"),
            Self::InvalidReply(message) => write!(f, "invalid build reply: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for BuildError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<RepoError> for BuildError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(EntityRef::Route(id)) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for BuildError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildClientConfig {
    /// Work queue the build worker consumes.
    pub queue: String,
    pub reply_timeout: Duration,
}

impl BuildClientConfig {
    pub fn new(queue: impl Into<String>, reply_timeout: Duration) -> Self {
        Self {
            queue: queue.into(),
            reply_timeout,
        }
    }

    pub fn from_broker(config: &BrokerConfig) -> Self {
        Self::new(config.queue.clone(), config.reply_timeout())
    }
}

/// Successful build result.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub correlation_id: Uuid,
    pub state: BuildState,
    pub route: RouteDetail,
}

/// Request payload gathered for one route.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub route: RouteId,
    pub body: Value,
}

/// Drives build exchanges over a [`BrokerTransport`].
///
/// Holds no per-request state, so one client can serve concurrent builds.
pub struct BuildRequestClient<T: BrokerTransport> {
    transport: T,
    config: BuildClientConfig,
}

impl<T: BrokerTransport> BuildRequestClient<T> {
    pub fn new(transport: T, config: BuildClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &BuildClientConfig {
        &self.config
    }

    /// Runs one exchange for `route` and stores the reply.
    pub fn request_build(
        &self,
        conn: &Connection,
        author: AuthorId,
        route: RouteId,
    ) -> Result<BuildOutcome, BuildError> {
        let mut exchange = Exchange::new(route);
        let result = self.run(conn, author, &mut exchange);
        match &result {
            Ok(_) => exchange.transition(BuildState::Applied),
            Err(err) => {
                exchange.transition(err.state());
                warn!(
                    "event=build_request module=build status=error route_uuid={route} \
                     correlation_id={} error={err}",
                    exchange.correlation_id
                );
            }
        }
        result
    }

    fn run(
        &self,
        conn: &Connection,
        author: AuthorId,
        exchange: &mut Exchange,
    ) -> Result<BuildOutcome, BuildError> {
        let request = gather_build_request(conn, author, exchange.route)?;
        let body = serde_json::to_vec(&request.body)
            .map_err(|err| RepoError::InvalidData(format!("cannot encode build request: {err}")))?;

        exchange.transition(BuildState::Publishing);
        let channel_name = format!("{REPLY_CHANNEL_PREFIX}.{}", exchange.correlation_id);
        let channel = self.transport.provision_reply_channel(&channel_name)?;
        let guard = ChannelGuard::new(&self.transport, channel);

        let mut headers = BTreeMap::new();
        headers.insert(ROUTE_UUID_HEADER.to_string(), exchange.route.to_string());
        let message = OutboundMessage {
            routing_key: self.config.queue.clone(),
            correlation_id: exchange.correlation_id.to_string(),
            reply_to: guard.channel.name.clone(),
            headers,
            body,
        };
        self.transport.publish(&message)?;

        exchange.transition(BuildState::AwaitingReply);
        let reply = self
            .transport
            .await_one_message(&guard.channel, self.config.reply_timeout)?;
        guard.finish();

        let Some(reply) = reply else {
            return Err(BuildError::Timeout {
                correlation_id: exchange.correlation_id,
                waited: self.config.reply_timeout,
            });
        };
        let details = decode_reply(&reply, exchange.correlation_id)?;

        let repo = SqliteRouteRepository::new(conn);
        repo.set_route_details(exchange.route, &details)?;
        let route = repo
            .get_route(author, exchange.route)?
            .ok_or(BuildError::NotFound(exchange.route))?;

        Ok(BuildOutcome {
            correlation_id: exchange.correlation_id,
            state: BuildState::Applied,
            route,
        })
    }
}

/// Reads the route and its relations from one snapshot and encodes the
/// request body.
pub fn gather_build_request(
    conn: &Connection,
    author: AuthorId,
    route: RouteId,
) -> Result<BuildRequest, BuildError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Deferred)?;
    let detail = load_route_detail(&tx, author, route)?.ok_or(BuildError::NotFound(route))?;
    tx.commit()?;

    Ok(BuildRequest {
        route,
        body: build_request_body(&detail)?,
    })
}

/// `{"points_coordinates": [[lat, lon], ...], <internal_name>: <typed>, ...}`
pub fn build_request_body(detail: &RouteDetail) -> Result<Value, BuildError> {
    let points: Vec<Value> = detail
        .places
        .iter()
        .map(|place| {
            json!([
                place.coordinates.latitude(),
                place.coordinates.longitude()
            ])
        })
        .collect();

    let mut body = Map::new();
    body.insert(POINTS_COORDINATES_KEY.to_string(), Value::Array(points));
    for item in &detail.criteria {
        let typed = cast_value(item.kind, &item.value).map_err(|source| {
            BuildError::Repo(RepoError::InvalidValue {
                internal_name: item.internal_name.clone(),
                source,
            })
        })?;
        body.insert(item.internal_name.clone(), typed.into_json());
    }
    Ok(Value::Object(body))
}

fn decode_reply(reply: &InboundMessage, correlation_id: Uuid) -> Result<Value, BuildError> {
    if let Some(received) = reply.correlation_id.as_deref() {
        if received != correlation_id.to_string() {
            return Err(BuildError::InvalidReply(format!(
                "correlation id mismatch: expected {correlation_id}, got {received}"
            )));
        }
    }
    let value: Value = serde_json::from_slice(&reply.body)
        .map_err(|err| BuildError::InvalidReply(format!("body is not json: {err}")))?;
    if !value.is_object() {
        return Err(BuildError::InvalidReply(
            "body is not a json object".to_string(),
        ));
    }
    Ok(value)
}

/// Per-invocation lifecycle tracker.
struct Exchange {
    route: RouteId,
    correlation_id: Uuid,
    state: BuildState,
}

impl Exchange {
    fn new(route: RouteId) -> Self {
        Self {
            route,
            correlation_id: Uuid::new_v4(),
            state: BuildState::Idle,
        }
    }

    fn transition(&mut self, next: BuildState) {
        debug!(
            "event=build_state module=build from={} to={} correlation_id={}",
            self.state.as_str(),
            next.as_str(),
            self.correlation_id
        );
        self.state = next;
        if next.is_terminal() {
            info!(
                "event=build_request module=build status={} route_uuid={} correlation_id={}",
                next.as_str(),
                self.route,
                self.correlation_id
            );
        }
    }
}

/// Tears the reply channel down when dropped unless already finished.
struct ChannelGuard<'t, T: BrokerTransport> {
    transport: &'t T,
    channel: ReplyChannel,
    released: bool,
}

impl<'t, T: BrokerTransport> ChannelGuard<'t, T> {
    fn new(transport: &'t T, channel: ReplyChannel) -> Self {
        Self {
            transport,
            channel,
            released: false,
        }
    }

    fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.transport.teardown_channel(&self.channel) {
            warn!(
                "event=reply_channel_teardown module=build status=error channel={} error={err}",
                self.channel.name
            );
        }
    }
}

impl<T: BrokerTransport> Drop for ChannelGuard<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}
