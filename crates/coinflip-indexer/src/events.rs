//! Contract event extraction and mapping (SPEC_FULL §4.4 "Event
//! extraction", §9 "duck-typed attributes become explicit variants", §6
//! "Event-stream ambiguity"). Takes the [`ChainEvent`]s already gathered
//! from both the modern and legacy tx-response locations by
//! `coinflip-chain`, filters to the ones that belong to the configured
//! contract, and maps each to a stable [`EventType`].

use coinflip_chain::types::ChainEvent;
use coinflip_core::types::EventType;

/// A contract event already confirmed to belong to the configured
/// contract address, with its action resolved to a stable [`EventType`].
pub struct MappedEvent<'a> {
    pub event_type: EventType,
    pub raw: &'a ChainEvent,
}

/// Map every [`ChainEvent`] in a transaction's event list to the events
/// this core cares about, filtering out anything addressed to a different
/// contract or whose `action` isn't one of the six recognized ones.
///
/// Handles both event-name forks (SPEC_FULL GLOSSARY "Event-stream
/// ambiguity"): the modern `wasm` type with an `action` attribute, and the
/// legacy `wasm-<action>` type some chain SDK versions emit instead.
pub fn extract_contract_events<'a>(
    events: &'a [ChainEvent],
    contract_addr: &str,
) -> Vec<MappedEvent<'a>> {
    events
        .iter()
        .filter_map(|ev| map_one(ev, contract_addr))
        .collect()
}

fn map_one<'a>(ev: &'a ChainEvent, contract_addr: &str) -> Option<MappedEvent<'a>> {
    if ev.event_type == "wasm" {
        if ev.attr("_contract_address") != Some(contract_addr) {
            return None;
        }
        let action = ev.attr("action")?;
        let event_type = EventType::from_action_str(action)?;
        return Some(MappedEvent { event_type, raw: ev });
    }

    if ev.event_type.starts_with("wasm-") {
        // Legacy fork: the action lives in the event-type suffix instead of
        // an `action` attribute. When present, the contract-address
        // attribute is still honored; some chain versions omit it on this
        // fork, so its absence doesn't disqualify the event.
        if let Some(addr) = ev.attr("_contract_address") {
            if addr != contract_addr {
                return None;
            }
        }
        let event_type = EventType::from_action_str(&ev.event_type)?;
        return Some(MappedEvent { event_type, raw: ev });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn wasm_event(contract: &str, action: &str, extra: &[(&str, &str)]) -> ChainEvent {
        let mut attributes: BTreeMap<String, String> = BTreeMap::new();
        attributes.insert("_contract_address".into(), contract.into());
        attributes.insert("action".into(), action.into());
        for (k, v) in extra {
            attributes.insert((*k).into(), (*v).into());
        }
        ChainEvent {
            event_type: "wasm".into(),
            attributes,
        }
    }

    #[test]
    fn modern_event_maps_by_action_attribute() {
        let ev = wasm_event("cosmos1contract", "create_bet", &[("bet_id", "42")]);
        let mapped = extract_contract_events(&[ev], "cosmos1contract");
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].event_type, EventType::BetCreated);
    }

    #[test]
    fn wrong_contract_is_filtered_out() {
        let ev = wasm_event("cosmos1other", "create_bet", &[]);
        let mapped = extract_contract_events(&[ev], "cosmos1contract");
        assert!(mapped.is_empty());
    }

    #[test]
    fn legacy_suffix_event_maps_equivalently() {
        let ev = ChainEvent {
            event_type: "wasm-accept_bet".into(),
            attributes: BTreeMap::new(),
        };
        let mapped = extract_contract_events(&[ev], "cosmos1contract");
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].event_type, EventType::BetAccepted);
    }

    #[test]
    fn unknown_action_is_ignored() {
        let ev = wasm_event("cosmos1contract", "transfer", &[]);
        let mapped = extract_contract_events(&[ev], "cosmos1contract");
        assert!(mapped.is_empty());
    }
}
