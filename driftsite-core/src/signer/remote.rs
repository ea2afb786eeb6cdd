// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote Interactive Signer
//!
//! The secret key lives with another party reachable over the relay mesh.
//! Requests are JSON-RPC-style frames sealed to the signer's key and
//! wrapped in kind-24133 envelopes; replies come back the same way,
//! addressed to a per-session keypair and matched by correlation id.
//!
//! The transport is an actor: one task owns the subscription connection
//! and the pending-request map, callers talk to it through a mailbox and
//! await a correlated reply. Many requests may be in flight; requests from
//! one caller are dispatched in order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use secp256k1::XOnlyPublicKey;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::envelope::ConversationKey;
use super::{LocalSigner, Signer, SignerError};
use crate::event::{kinds, unix_time, Event, EventTemplate, Tag};
use crate::keys::{decode_prefixed, encode_prefixed, parse_public_key, Keys};
use crate::relay::{
    any_accepted, publish_to_relays, ClientMessage, Filter, RelayMessage, RelayTransport,
    TransportConnector, CONNECT_TIMEOUT,
};
use crate::report::{Category, Collector};

/// Lower bound on the signer round-trip budget.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Bech32 prefix of credential blobs.
const CREDENTIAL_HRP: &str = "ncred";

/// Long-lived remote-signer credentials: everything needed to
/// reconstitute a ready signer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignerCredentials {
    /// The remote signer's public key (hex).
    pub signer_pubkey: String,
    /// Relays the signer listens on.
    pub relays: Vec<String>,
    /// Shared secret presented during the connect handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl SignerCredentials {
    /// Encodes the credentials as one opaque `ncred…` blob.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("credential serialization cannot fail");
        encode_prefixed(CREDENTIAL_HRP, &json)
    }

    /// Decodes an `ncred…` blob.
    pub fn decode(input: &str) -> Result<Self, SignerError> {
        let bytes = decode_prefixed(CREDENTIAL_HRP, input.trim())
            .map_err(|e| SignerError::InvalidCredential(e.to_string()))?;
        let credentials: SignerCredentials = serde_json::from_slice(&bytes)
            .map_err(|e| SignerError::InvalidCredential(e.to_string()))?;
        if credentials.relays.is_empty() {
            return Err(SignerError::InvalidCredential(
                "credential names no relays".into(),
            ));
        }
        Ok(credentials)
    }
}

/// Request frame sealed into an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RpcRequest {
    pub id: String,
    pub method: String,
    pub params: Vec<String>,
}

/// Reply frame. Exactly one of `result`/`error` is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RpcResponse {
    pub id: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

struct Command {
    request: RpcRequest,
    reply: oneshot::Sender<Result<RpcResponse, SignerError>>,
}

/// Signer variant that forwards templates to a remote peer.
#[derive(Debug)]
pub struct RemoteSigner {
    commands: mpsc::Sender<Command>,
    user_pubkey: XOnlyPublicKey,
    user_pubkey_hex: String,
    rpc_timeout: Duration,
}

impl RemoteSigner {
    /// Connects to the signer described by `credentials`: opens a
    /// subscription for replies, performs the `connect` handshake and
    /// resolves the user's public key.
    pub async fn connect<C: TransportConnector + 'static>(
        connector: Arc<C>,
        credentials: &SignerCredentials,
        rpc_timeout: Duration,
        collector: Arc<Collector>,
        cancel: CancellationToken,
    ) -> Result<Self, SignerError> {
        let signer_pubkey = parse_public_key(&credentials.signer_pubkey)?;
        let signer_pubkey_hex = hex::encode(signer_pubkey.serialize());

        let session = Keys::generate();
        let conversation = ConversationKey::derive(&session, &signer_pubkey);
        let session_pubkey_hex = session.public_key_hex();

        let (subscription, subscription_id) = open_subscription(
            connector.as_ref(),
            &credentials.relays,
            &session_pubkey_hex,
            &collector,
        )
        .await?;

        let (commands_tx, commands_rx) = mpsc::channel(16);
        let actor = SignerLoop {
            connector,
            relays: credentials.relays.clone(),
            session: LocalSigner::new(session),
            conversation,
            subscription,
            subscription_id,
            signer_pubkey_hex: signer_pubkey_hex.clone(),
            pending: HashMap::new(),
            collector,
            cancel,
        };
        tokio::spawn(actor.run(commands_rx));

        // Handshake: a connect that never completes means the peer is
        // unreachable, not merely slow.
        let connect_params = vec![
            signer_pubkey_hex,
            credentials.secret.clone().unwrap_or_default(),
        ];
        request(&commands_tx, rpc_timeout, "connect", connect_params)
            .await
            .map_err(|e| match e {
                SignerError::Timeout => {
                    SignerError::Unreachable("no response to connect handshake".into())
                }
                other => other,
            })?;

        let pubkey_hex = request(&commands_tx, rpc_timeout, "get_public_key", vec![]).await?;
        let user_pubkey = parse_public_key(&pubkey_hex)?;

        Ok(RemoteSigner {
            commands: commands_tx,
            user_pubkey,
            user_pubkey_hex: hex::encode(user_pubkey.serialize()),
            rpc_timeout,
        })
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<(), SignerError> {
        request(&self.commands, self.rpc_timeout, "ping", vec![]).await?;
        Ok(())
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn public_key(&self) -> Result<XOnlyPublicKey, SignerError> {
        Ok(self.user_pubkey)
    }

    async fn sign(&self, template: EventTemplate) -> Result<Event, SignerError> {
        let params = vec![serde_json::to_string(&template)
            .map_err(|e| SignerError::Transport(e.to_string()))?];
        let result = request(&self.commands, self.rpc_timeout, "sign_event", params).await?;

        let event: Event = serde_json::from_str(&result)
            .map_err(|_| SignerError::Transport("signer returned a malformed event".into()))?;
        event
            .verify()
            .map_err(|e| SignerError::Rejected(format!("signer returned an invalid event: {e}")))?;
        if event.pubkey != self.user_pubkey_hex {
            return Err(SignerError::Rejected(
                "signer returned an event for a different key".into(),
            ));
        }
        Ok(event)
    }
}

/// Sends one request through the mailbox and awaits the correlated reply.
async fn request(
    commands: &mpsc::Sender<Command>,
    rpc_timeout: Duration,
    method: &str,
    params: Vec<String>,
) -> Result<String, SignerError> {
    let request = RpcRequest {
        id: random_request_id(),
        method: method.to_string(),
        params,
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    commands
        .send(Command {
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| SignerError::Transport("signer transport stopped".into()))?;

    let response = match timeout(rpc_timeout, reply_rx).await {
        Err(_) => return Err(SignerError::Timeout),
        Ok(Err(_)) => return Err(SignerError::Transport("signer transport stopped".into())),
        Ok(Ok(Err(e))) => return Err(e),
        Ok(Ok(Ok(response))) => response,
    };

    if let Some(error) = response.error {
        return Err(SignerError::Rejected(error));
    }
    response
        .result
        .ok_or_else(|| SignerError::Transport("signer reply carried no result".into()))
}

/// Opens the reply subscription on the first reachable signer relay.
async fn open_subscription<C: TransportConnector>(
    connector: &C,
    relays: &[String],
    session_pubkey_hex: &str,
    collector: &Collector,
) -> Result<(C::Transport, String), SignerError> {
    for url in relays {
        let mut transport = match timeout(CONNECT_TIMEOUT, connector.connect(url)).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                collector.record(Category::Relay, url, format!("signer relay: {e}"));
                continue;
            }
            Err(_) => {
                collector.record(Category::Relay, url, "signer relay: connect timed out");
                continue;
            }
        };

        let subscription_id = random_request_id();
        let filter = Filter::new()
            .kinds([kinds::SIGNER_ENVELOPE])
            .p_tag(session_pubkey_hex)
            .since(unix_time().saturating_sub(10));
        match transport
            .send(ClientMessage::Req {
                subscription_id: subscription_id.clone(),
                filter,
            })
            .await
        {
            Ok(()) => {
                debug!(%url, "signer subscription open");
                return Ok((transport, subscription_id));
            }
            Err(e) => {
                collector.record(Category::Relay, url, format!("signer relay: {e}"));
                transport.close().await;
            }
        }
    }
    Err(SignerError::Unreachable(
        "no signer relay reachable".into(),
    ))
}

/// The actor owning the subscription connection and the pending map.
struct SignerLoop<C: TransportConnector + 'static> {
    connector: Arc<C>,
    relays: Vec<String>,
    session: LocalSigner,
    conversation: ConversationKey,
    subscription: C::Transport,
    subscription_id: String,
    signer_pubkey_hex: String,
    pending: HashMap<String, oneshot::Sender<Result<RpcResponse, SignerError>>>,
    collector: Arc<Collector>,
    cancel: CancellationToken,
}

impl<C: TransportConnector + 'static> SignerLoop<C> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    None => break,
                    Some(command) => self.dispatch(command).await,
                },
                frame = self.subscription.recv() => match frame {
                    Ok(Some(frame)) => self.handle_frame(frame),
                    Ok(None) => {
                        warn!("signer subscription closed by relay");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "signer subscription failed");
                        break;
                    }
                },
            }
        }
        self.subscription.close().await;
        // Dropping the pending map wakes every waiting caller with a
        // transport error.
    }

    /// Seals, signs and fans out one request, then parks the reply slot.
    async fn dispatch(&mut self, command: Command) {
        let json = match serde_json::to_string(&command.request) {
            Ok(json) => json,
            Err(e) => {
                let _ = command
                    .reply
                    .send(Err(SignerError::Transport(e.to_string())));
                return;
            }
        };
        let content = match self.conversation.seal(json.as_bytes()) {
            Ok(content) => content,
            Err(e) => {
                let _ = command
                    .reply
                    .send(Err(SignerError::Transport(e.to_string())));
                return;
            }
        };

        let template = EventTemplate::new(
            kinds::SIGNER_ENVELOPE,
            vec![Tag::new("p", [self.signer_pubkey_hex.as_str()])],
            content,
        );
        let envelope = self.session.sign_template(template);

        let outcomes = publish_to_relays(
            &self.connector,
            &self.relays,
            &envelope,
            &self.collector,
            &self.cancel,
        )
        .await;
        if !any_accepted(&outcomes) {
            let _ = command.reply.send(Err(SignerError::Unreachable(
                "no relay accepted the signer request".into(),
            )));
            return;
        }
        self.pending.insert(command.request.id.clone(), command.reply);
    }

    /// Routes one incoming envelope to its waiting caller.
    fn handle_frame(&mut self, frame: RelayMessage) {
        let RelayMessage::Event {
            subscription_id,
            event,
        } = frame
        else {
            return;
        };
        if subscription_id != self.subscription_id || event.kind != kinds::SIGNER_ENVELOPE {
            return;
        }
        if event.pubkey != self.signer_pubkey_hex {
            debug!(id = %event.id, "dropping envelope from unexpected key");
            return;
        }
        if event.verify().is_err() {
            warn!(id = %event.id, "dropping unverifiable envelope");
            return;
        }

        let plaintext = match self.conversation.open(&event.content) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(id = %event.id, error = %e, "dropping undecryptable envelope");
                return;
            }
        };
        let response: RpcResponse = match serde_json::from_slice(&plaintext) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "dropping malformed signer reply");
                return;
            }
        };

        if let Some(reply) = self.pending.remove(&response.id) {
            let _ = reply.send(Ok(response));
        } else {
            debug!(id = %response.id, "reply with no pending request");
        }
    }
}

fn random_request_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}
