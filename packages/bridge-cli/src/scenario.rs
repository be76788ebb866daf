//! Canned traffic for the probe: a handful of asynchronous calls with
//! scripted native replies, two synchronous getters and one pushed
//! notification.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use platform_bridge::sim::{SimArg, SimMessage, SimSyncValue, SimulatedPlatform};
use platform_bridge::{
    Arg, AsyncEntryPoint, CallbackRouter, Envelope, KeyValue, KeyValueBag, MessageType, Payload,
    PlatformBridge, Result, SyncEntryPoint,
};
use serde::Serialize;

const GET_ACCESS_TOKEN: AsyncEntryPoint = AsyncEntryPoint::new("User", "GetAccessToken");
const CLOUD_LOAD: AsyncEntryPoint = AsyncEntryPoint::new("CloudStorage", "Load");
const ROOM_UPDATE: AsyncEntryPoint = AsyncEntryPoint::new("Room", "UpdateDataStore");
const IAP_CONSUME: AsyncEntryPoint = AsyncEntryPoint::new("Iap", "ConsumePurchase");
const SERVER_TIME: AsyncEntryPoint = AsyncEntryPoint::new("Platform", "GetServerTime");

const LOCALE: SyncEntryPoint = SyncEntryPoint::new("Application", "Locale");
const LOGGED_IN_USER: SyncEntryPoint = SyncEntryPoint::new("User", "LoggedInUserID");

/// What the probe observed for one message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// Message type symbol
    pub message_type: &'static str,
    /// Request handle, absent for notifications
    pub handle: Option<u64>,
    /// Whether the native side reported a failure
    pub failed: bool,
    /// Human-readable summary
    pub summary: String,
}

/// Shared log of outcomes, appended to by router callbacks
pub type Outcomes = Rc<RefCell<Vec<Outcome>>>;

fn describe(envelope: &Envelope) -> Outcome {
    let summary = match &envelope.outcome {
        Ok(Payload::Empty) => "ok".to_string(),
        Ok(Payload::Text(text)) => format!("text {:?}", text),
        Ok(Payload::Blob(bytes)) => format!("blob of {} bytes", bytes.len()),
        Ok(Payload::DataStore(store)) => {
            let pairs: Vec<String> = store.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("data store {{{}}}", pairs.join(", "))
        }
        Ok(Payload::Timestamp(t)) => format!("timestamp {}", t.to_rfc3339()),
        Err(record) => record.to_string(),
    };
    Outcome {
        message_type: envelope.message_type.symbol(),
        handle: envelope.request.map(|h| h.get()),
        failed: envelope.is_error(),
        summary,
    }
}

fn stringify(value: &KeyValue) -> String {
    match value {
        KeyValue::Str(s) => s.clone(),
        KeyValue::Int(i) => i.to_string(),
        KeyValue::Double(d) => d.to_string(),
    }
}

/// Script the simulated native replies for every entry point the probe uses
pub fn install_handlers(sim: &SimulatedPlatform, namespace: &str) {
    sim.register_async(GET_ACCESS_TOKEN.symbol(namespace), |call| {
        Some(
            SimMessage::for_request(call.handle, MessageType::UserGetAccessToken)
                .text(&format!("probe-token-{}", call.handle))
                .after_polls(1),
        )
    });

    sim.register_async(CLOUD_LOAD.symbol(namespace), |call| {
        let key = match call.args.get(1) {
            Some(SimArg::Str(key)) => key.clone(),
            _ => String::new(),
        };
        Some(
            SimMessage::for_request(call.handle, MessageType::CloudStorageLoad)
                .blob(key.as_bytes())
                .after_polls(2),
        )
    });

    sim.register_async(ROOM_UPDATE.symbol(namespace), |call| {
        let pairs: Vec<(String, String)> = match call.args.get(1) {
            Some(SimArg::KeyValues(entries)) => entries
                .iter()
                .map(|(k, v)| (k.clone(), stringify(v)))
                .collect(),
            _ => Vec::new(),
        };
        let refs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        Some(
            SimMessage::for_request(call.handle, MessageType::RoomUpdateDataStore)
                .data_store(&refs)
                .after_polls(1),
        )
    });

    sim.register_async(IAP_CONSUME.symbol(namespace), |call| {
        Some(
            SimMessage::for_request(call.handle, MessageType::IapConsumePurchase)
                .error(7, "entitlement missing")
                .display_message("You do not own this item."),
        )
    });

    sim.register_async(SERVER_TIME.symbol(namespace), |call| {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        Some(
            SimMessage::for_request(call.handle, MessageType::PlatformGetServerTime)
                .timestamp(now),
        )
    });

    sim.register_sync(LOCALE.symbol(namespace), |_| SimSyncValue::BorrowedStr("en_US".into()));
    sim.register_sync(LOGGED_IN_USER.symbol(namespace), |_| SimSyncValue::U64(4_200_042));

    sim.inject(
        SimMessage::notification(MessageType::NotificationRoomInviteAccepted)
            .text("room-1337")
            .after_polls(3),
    );
}

/// Issue the probe's calls and attach a callback to each
pub fn start(bridge: &PlatformBridge, router: &mut CallbackRouter) -> Result<Outcomes> {
    let outcomes: Outcomes = Rc::new(RefCell::new(Vec::new()));

    let locale = bridge.query(&LOCALE, &[])?;
    let user = bridge.query(&LOGGED_IN_USER, &[])?;
    tracing::info!(locale = ?locale, user = ?user, "sync getters");

    let mut room_data = KeyValueBag::new();
    room_data.insert("map", "dunes").insert("round", 3).insert("ratio", 0.75);

    let calls = [
        (&GET_ACCESS_TOKEN, vec![]),
        (&CLOUD_LOAD, vec![Arg::Str("saves"), Arg::Str("slot-1")]),
        (&ROOM_UPDATE, vec![Arg::U64(1337), Arg::KeyValues(&room_data)]),
        (&IAP_CONSUME, vec![Arg::Str("sku-gold")]),
        (&SERVER_TIME, vec![]),
    ];
    for (entry, args) in &calls {
        let handle = bridge.dispatch(entry, args)?;
        tracing::info!(
            handle = handle.get(),
            entry = %entry.symbol(&bridge.config().namespace),
            "dispatched"
        );
        let sink = outcomes.clone();
        router.on_complete(handle, move |envelope| sink.borrow_mut().push(describe(&envelope)));
    }

    let sink = outcomes.clone();
    router.on_notification(MessageType::NotificationRoomInviteAccepted, move |envelope| {
        sink.borrow_mut().push(describe(&envelope))
    });

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_bridge::BridgeConfig;
    use std::sync::Arc;

    #[test]
    fn test_scenario_completes_every_request() {
        let sim = Arc::new(SimulatedPlatform::new());
        install_handlers(&sim, "plat");
        let bridge = PlatformBridge::new(sim.clone(), BridgeConfig::default()).unwrap();
        let mut router = CallbackRouter::new();
        let outcomes = start(&bridge, &mut router).unwrap();

        for _ in 0..10 {
            router.run_once(&bridge);
        }

        assert_eq!(bridge.pending_count(), 0);
        assert_eq!(router.waiting(), 0);
        assert_eq!(sim.live_messages(), 0);
        assert_eq!(sim.live_allocations(), 0);

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 6);
        let iap = outcomes
            .iter()
            .find(|o| o.message_type == "Iap_ConsumePurchase")
            .unwrap();
        assert!(iap.failed);
        assert!(iap.summary.contains("entitlement missing"));

        let room = outcomes
            .iter()
            .find(|o| o.message_type == "Room_UpdateDataStore")
            .unwrap();
        assert_eq!(room.summary, "data store {map=dunes, round=3, ratio=0.75}");

        assert!(outcomes.iter().any(|o| o.handle.is_none() && o.summary == "text \"room-1337\""));
    }

    #[test]
    fn test_handlers_follow_namespace() {
        let sim = Arc::new(SimulatedPlatform::new());
        install_handlers(&sim, "ovr");
        let config = BridgeConfig {
            namespace: "ovr".into(),
            ..Default::default()
        };
        let bridge = PlatformBridge::new(sim.clone(), config).unwrap();
        let mut router = CallbackRouter::new();
        start(&bridge, &mut router).unwrap();
        assert!(sim.calls().iter().all(|c| c.symbol.starts_with("ovr_")));
    }
}
