//! End-to-end remote signer tests against an in-memory relay hub that
//! also plays the signing peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use driftsite_core::event::kinds;
use driftsite_core::relay::{
    ClientMessage, RelayError, RelayMessage, RelayTransport, TransportConnector,
};
use driftsite_core::signer::envelope::ConversationKey;
use driftsite_core::{
    parse_public_key, Collector, EventTemplate, Keys, LocalSigner, RemoteSigner, Signer,
    SignerCredentials, SignerError, Tag,
};

type Inbound = mpsc::UnboundedSender<(usize, ClientMessage)>;
type Registration = mpsc::UnboundedSender<(usize, mpsc::UnboundedSender<RelayMessage>)>;

struct HubTransport {
    id: usize,
    to_hub: Inbound,
    from_hub: mpsc::UnboundedReceiver<RelayMessage>,
}

#[async_trait]
impl RelayTransport for HubTransport {
    async fn send(&mut self, frame: ClientMessage) -> Result<(), RelayError> {
        self.to_hub
            .send((self.id, frame))
            .map_err(|_| RelayError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError> {
        Ok(self.from_hub.recv().await)
    }

    async fn close(&mut self) {}
}

struct HubConnector {
    to_hub: Inbound,
    register: Registration,
    next_id: AtomicUsize,
}

#[async_trait]
impl TransportConnector for HubConnector {
    type Transport = HubTransport;

    async fn connect(&self, _url: &str) -> Result<HubTransport, RelayError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.register
            .send((id, tx))
            .map_err(|_| RelayError::ConnectionFailed("hub stopped".into()))?;
        Ok(HubTransport {
            id,
            to_hub: self.to_hub.clone(),
            from_hub: rx,
        })
    }
}

/// Starts the hub: a relay that acknowledges every event and, when
/// `respond` is set, decrypts signer envelopes and answers them like a
/// real signing peer.
fn start_hub(signer_keys: Keys, respond: bool) -> Arc<HubConnector> {
    let (to_hub, inbound) = mpsc::unbounded_channel();
    let (register, registrations) = mpsc::unbounded_channel();
    tokio::spawn(run_hub(signer_keys, inbound, registrations, respond));
    Arc::new(HubConnector {
        to_hub,
        register,
        next_id: AtomicUsize::new(0),
    })
}

async fn run_hub(
    signer_keys: Keys,
    mut inbound: mpsc::UnboundedReceiver<(usize, ClientMessage)>,
    mut registrations: mpsc::UnboundedReceiver<(usize, mpsc::UnboundedSender<RelayMessage>)>,
    respond: bool,
) {
    let local = LocalSigner::new(signer_keys.clone());
    let signer_pubkey_hex = signer_keys.public_key_hex();
    let mut outbound: HashMap<usize, mpsc::UnboundedSender<RelayMessage>> = HashMap::new();
    // (connection, subscription id, p-tag filter value)
    let mut subscriptions: Vec<(usize, String, String)> = Vec::new();

    loop {
        tokio::select! {
            biased;
            registration = registrations.recv() => match registration {
                Some((id, tx)) => {
                    outbound.insert(id, tx);
                }
                None => break,
            },
            message = inbound.recv() => match message {
                None => break,
                Some((connection, frame)) => match frame {
                    ClientMessage::Req { subscription_id, filter } => {
                        if let Some(p) = filter.p_tags.as_ref().and_then(|v| v.first()) {
                            subscriptions.push((connection, subscription_id.clone(), p.clone()));
                        }
                        if let Some(tx) = outbound.get(&connection) {
                            let _ = tx.send(RelayMessage::Eose { subscription_id });
                        }
                    }
                    ClientMessage::Event(event) => {
                        if let Some(tx) = outbound.get(&connection) {
                            let _ = tx.send(RelayMessage::Ok {
                                event_id: event.id.clone(),
                                accepted: true,
                                message: String::new(),
                            });
                        }
                        if !respond || event.kind != kinds::SIGNER_ENVELOPE {
                            continue;
                        }

                        let session_pub = parse_public_key(&event.pubkey).unwrap();
                        let conversation = ConversationKey::derive(&signer_keys, &session_pub);
                        let Ok(plaintext) = conversation.open(&event.content) else {
                            continue;
                        };
                        let request: serde_json::Value =
                            serde_json::from_slice(&plaintext).unwrap();
                        let id = request["id"].as_str().unwrap().to_string();
                        let result = match request["method"].as_str().unwrap() {
                            "connect" => "ack".to_string(),
                            "get_public_key" => signer_pubkey_hex.clone(),
                            "ping" => "pong".to_string(),
                            "sign_event" => {
                                let template: EventTemplate = serde_json::from_str(
                                    request["params"][0].as_str().unwrap(),
                                )
                                .unwrap();
                                serde_json::to_string(&local.sign_template(template)).unwrap()
                            }
                            _ => continue,
                        };

                        let response = serde_json::json!({ "id": id, "result": result });
                        let sealed = conversation
                            .seal(response.to_string().as_bytes())
                            .unwrap();
                        let reply = local.sign_template(EventTemplate::new(
                            kinds::SIGNER_ENVELOPE,
                            vec![Tag::new("p", [event.pubkey.as_str()])],
                            sealed,
                        ));

                        for (subscriber, sub_id, p) in &subscriptions {
                            if p == &event.pubkey {
                                if let Some(tx) = outbound.get(subscriber) {
                                    let _ = tx.send(RelayMessage::Event {
                                        subscription_id: sub_id.clone(),
                                        event: reply.clone(),
                                    });
                                }
                            }
                        }
                    }
                    ClientMessage::Close { .. } => {}
                },
            },
        }
    }
}

fn credentials_for(keys: &Keys) -> SignerCredentials {
    SignerCredentials {
        signer_pubkey: keys.public_key_hex(),
        relays: vec!["wss://hub.example".to_string()],
        secret: Some("pairing-secret".to_string()),
    }
}

#[tokio::test]
async fn test_remote_signer_full_round_trip() {
    let signer_keys = Keys::generate();
    let connector = start_hub(signer_keys.clone(), true);

    let remote = RemoteSigner::connect(
        connector,
        &credentials_for(&signer_keys),
        Duration::from_secs(5),
        Arc::new(Collector::new()),
        CancellationToken::new(),
    )
    .await
    .expect("connect succeeds");

    assert_eq!(
        remote.public_key().await.unwrap(),
        signer_keys.public_key()
    );

    let template = EventTemplate::new(
        kinds::FILE_ANNOUNCEMENT,
        vec![
            Tag::new("d", ["/index.html"]),
            Tag::new("x", ["00".repeat(32)]),
        ],
        "",
    );
    let event = remote.sign(template).await.expect("sign succeeds");
    event.verify().expect("remotely signed event verifies");
    assert_eq!(event.pubkey, signer_keys.public_key_hex());
    assert_eq!(event.tag_value("d"), Some("/index.html"));

    remote.ping().await.expect("ping succeeds");
}

#[tokio::test]
async fn test_many_requests_in_flight_are_correlated() {
    let signer_keys = Keys::generate();
    let connector = start_hub(signer_keys.clone(), true);

    let remote = RemoteSigner::connect(
        connector,
        &credentials_for(&signer_keys),
        Duration::from_secs(5),
        Arc::new(Collector::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let signs = (0..5).map(|i| {
        let template = EventTemplate::new(
            kinds::FILE_ANNOUNCEMENT,
            vec![
                Tag::new("d", [format!("/page-{i}.html")]),
                Tag::new("x", ["00".repeat(32)]),
            ],
            "",
        );
        remote.sign(template)
    });

    let events = join_all(signs).await;
    for (i, event) in events.into_iter().enumerate() {
        let event = event.expect("each sign succeeds");
        assert_eq!(
            event.tag_value("d"),
            Some(format!("/page-{i}.html").as_str())
        );
        event.verify().unwrap();
    }
}

#[tokio::test]
async fn test_unreachable_signer_relays() {
    struct DeadConnector;

    #[async_trait]
    impl TransportConnector for DeadConnector {
        type Transport = HubTransport;

        async fn connect(&self, _url: &str) -> Result<HubTransport, RelayError> {
            Err(RelayError::ConnectionFailed("refused".into()))
        }
    }

    let signer_keys = Keys::generate();
    let err = RemoteSigner::connect(
        Arc::new(DeadConnector),
        &credentials_for(&signer_keys),
        Duration::from_secs(1),
        Arc::new(Collector::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SignerError::Unreachable(_)));
}

#[tokio::test]
async fn test_silent_signer_times_out_as_unreachable() {
    let signer_keys = Keys::generate();
    // The hub acknowledges the envelope but never answers it.
    let connector = start_hub(signer_keys.clone(), false);

    let err = RemoteSigner::connect(
        connector,
        &credentials_for(&signer_keys),
        Duration::from_millis(200),
        Arc::new(Collector::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SignerError::Unreachable(_)));
}
