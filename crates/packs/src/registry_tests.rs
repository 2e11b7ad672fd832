// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "system.uptime", Some(("system", "uptime")) },
    nested = { "system.disk.usage", Some(("system", "disk.usage")) },
    no_dot = { "uptime", None },
    empty_pack = { ".uptime", None },
    empty_rest = { "system.", None },
)]
fn splits_probe_names(probe: &str, expected: Option<(&str, &str)>) {
    assert_eq!(split_probe_name(probe), expected);
}

#[test]
fn builtin_registry_contains_both_planes() {
    let registry = PackRegistry::builtin();
    assert!(registry.get("system").is_some());
    assert!(registry.get("httpbin").is_some());
    assert!(registry.is_integration_probe("httpbin.ip"));
    assert!(!registry.is_integration_probe("system.uptime"));
    assert!(!registry.is_integration_probe("unknown.probe"));
}

#[test]
fn local_for_agent_filters_disabled_and_integrations() {
    let disabled = ["logs".to_string()].into_iter().collect();
    let registry = PackRegistry::local_for_agent(&disabled);
    assert!(registry.get("system").is_some());
    assert!(registry.get("logs").is_none());
    assert!(registry.get("httpbin").is_none());
}

#[test]
fn manifest_timeouts_surface_through_registry() {
    let registry = PackRegistry::builtin();
    assert_eq!(registry.probe_timeout_ms("system.disk.usage"), Some(10_000));
    assert_eq!(registry.probe_timeout_ms("system.nope"), None);
    assert_eq!(registry.probe_timeout_ms("nodot"), None);
}

#[test]
fn every_builtin_handler_has_a_manifest_entry() {
    let registry = PackRegistry::builtin();
    for pack in registry.iter() {
        let declared: Vec<&str> =
            pack.manifest.probes.iter().map(|p| p.name.as_str()).collect();
        match &pack.kind {
            PackKind::Local(handlers) => {
                for name in handlers.keys() {
                    assert!(declared.contains(&name.as_str()), "{name} undeclared");
                }
            }
            PackKind::Integration { handlers, .. } => {
                for name in handlers.keys() {
                    assert!(declared.contains(&name.as_str()), "{name} undeclared");
                }
            }
        }
    }
}
