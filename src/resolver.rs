//! Socket name resolution.
//!
//! Models rarely use the exact socket names the runtime exposes. The
//! search here recovers the intended socket through progressively looser
//! strategies, and handles overloaded nodes (several same-named sockets
//! whose active one depends on a selector property) through the catalog's
//! fixed index tables instead of name matching.

use anyhow::Result;
use log::{debug, warn};

use crate::catalog::{NodeCatalog, NodeTypeDescriptor};
use crate::runtime::{NodeGraphRuntime, NodeHandle, RuntimeSocket, SocketDir};

/// Finds the index of the socket a requested name refers to.
///
/// Strategies in order: exact name, case-insensitive, substring in either
/// direction, then the catalog's global alias table. Hidden sockets never
/// match. For inputs an unlinked candidate wins over a linked one, but a
/// linked socket is still acceptable (the runtime replaces the link).
pub fn find_socket(
    catalog: &NodeCatalog,
    sockets: &[RuntimeSocket],
    requested: &str,
    dir: SocketDir,
) -> Option<usize> {
    let lower = requested.to_lowercase();
    let visible = |(_, s): &(usize, &RuntimeSocket)| !s.hidden;

    let mut matches: Vec<usize> = sockets
        .iter()
        .enumerate()
        .filter(visible)
        .filter(|(_, s)| s.name == requested)
        .map(|(i, _)| i)
        .collect();

    if matches.is_empty() {
        matches = sockets
            .iter()
            .enumerate()
            .filter(visible)
            .filter(|(_, s)| s.name.to_lowercase() == lower)
            .map(|(i, _)| i)
            .collect();
    }

    if matches.is_empty() {
        matches = sockets
            .iter()
            .enumerate()
            .filter(visible)
            .filter(|(_, s)| {
                let name = s.name.to_lowercase();
                name.contains(&lower) || lower.contains(&name)
            })
            .map(|(i, _)| i)
            .collect();
    }

    if matches.is_empty() {
        for alias in catalog.socket_aliases(requested) {
            for (i, s) in sockets.iter().enumerate() {
                if !s.hidden && &s.name == alias {
                    matches.push(i);
                }
            }
        }
    }

    if matches.is_empty() {
        return None;
    }

    match dir {
        SocketDir::Input => matches
            .iter()
            .copied()
            .find(|&i| !sockets[i].is_linked)
            .or(Some(matches[0])),
        SocketDir::Output => Some(matches[0]),
    }
}

/// Resolves a logical socket name on an overloaded node to its concrete
/// index for the given selector value. Returns `None` when the node has no
/// overload table, the name is not one of the overloaded logical names, or
/// the selector value is unknown; callers then fall back to [`find_socket`].
pub fn resolve_overload(
    desc: &NodeTypeDescriptor,
    selector_value: Option<&str>,
    requested: &str,
    dir: SocketDir,
) -> Option<usize> {
    let table = desc.overload.as_ref()?;
    let lower = requested.to_lowercase();

    let Some(selector_value) = selector_value else {
        warn!(
            "node type '{}' uses overloaded sockets but '{}' is not set, falling back to name search",
            desc.type_name, table.selector
        );
        return None;
    };
    let indices = table.by_selector.get(&selector_value.to_uppercase())?;

    let resolved = match dir {
        SocketDir::Input => match lower.as_str() {
            "fac" | "factor" => Some(indices.factor),
            "a" | "color1" => Some(indices.a),
            "b" | "color2" => Some(indices.b),
            _ => None,
        },
        SocketDir::Output => match lower.as_str() {
            "result" | "color" | "value" => Some(indices.result),
            _ => None,
        },
    };
    if let Some(i) = resolved {
        debug!(
            "resolved overloaded socket '{requested}' on '{}' to index {i} for {}={selector_value}",
            desc.type_name, table.selector
        );
    }
    resolved
}

/// Hides the input sockets that are inactive under the given selector
/// value, and re-shows the active ones.
pub fn apply_socket_visibility(
    runtime: &mut dyn NodeGraphRuntime,
    node: NodeHandle,
    desc: &NodeTypeDescriptor,
    selector_value: &str,
) -> Result<()> {
    let Some(table) = desc.overload.as_ref() else {
        return Ok(());
    };
    let Some(indices) = table.by_selector.get(&selector_value.to_uppercase()) else {
        return Ok(());
    };
    let input_count = runtime.input_sockets(node).len();
    for i in 0..input_count {
        let hidden = !indices.visible_inputs.contains(&i);
        runtime.set_socket_hidden(node, SocketDir::Input, i, hidden)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SocketKind, catalog};
    use crate::runtime::MemoryRuntime;

    fn sock(name: &str, linked: bool) -> RuntimeSocket {
        RuntimeSocket {
            name: name.to_string(),
            kind: SocketKind::Float,
            is_linked: linked,
            hidden: false,
        }
    }

    #[test]
    fn exact_match_wins_over_substring() {
        let cat = catalog().unwrap();
        let sockets = vec![sock("Roughness", false), sock("Rough", false)];
        assert_eq!(
            find_socket(cat, &sockets, "Rough", SocketDir::Input),
            Some(1)
        );
    }

    #[test]
    fn case_insensitive_then_substring() {
        let cat = catalog().unwrap();
        let sockets = vec![sock("Base Color", false), sock("Metallic", false)];
        assert_eq!(
            find_socket(cat, &sockets, "base color", SocketDir::Input),
            Some(0)
        );
        assert_eq!(find_socket(cat, &sockets, "Metal", SocketDir::Input), Some(1));
    }

    #[test]
    fn alias_table_reaches_renamed_sockets() {
        let cat = catalog().unwrap();
        // "BSDF" requested on a node whose output is named "Shader".
        let sockets = vec![sock("Shader", false)];
        assert_eq!(find_socket(cat, &sockets, "BSDF", SocketDir::Output), Some(0));
    }

    #[test]
    fn inputs_prefer_unlinked_but_accept_linked() {
        let cat = catalog().unwrap();
        let sockets = vec![sock("Shader", true), sock("Shader", false)];
        assert_eq!(
            find_socket(cat, &sockets, "Shader", SocketDir::Input),
            Some(1)
        );
        let all_linked = vec![sock("Shader", true), sock("Shader", true)];
        assert_eq!(
            find_socket(cat, &all_linked, "Shader", SocketDir::Input),
            Some(0)
        );
    }

    #[test]
    fn hidden_sockets_never_match() {
        let cat = catalog().unwrap();
        let mut sockets = vec![sock("Fac", false)];
        sockets[0].hidden = true;
        assert_eq!(find_socket(cat, &sockets, "Fac", SocketDir::Input), None);
    }

    #[test]
    fn overload_indices_follow_selector() {
        let cat = catalog().unwrap();
        let mix = cat.descriptor("ShaderNodeMix").unwrap();
        assert_eq!(
            resolve_overload(mix, Some("RGBA"), "A", SocketDir::Input),
            Some(6)
        );
        assert_eq!(
            resolve_overload(mix, Some("rgba"), "Color2", SocketDir::Input),
            Some(7)
        );
        assert_eq!(
            resolve_overload(mix, Some("FLOAT"), "Factor", SocketDir::Input),
            Some(0)
        );
        assert_eq!(
            resolve_overload(mix, Some("VECTOR"), "Result", SocketDir::Output),
            Some(1)
        );
        // Missing selector and unknown names fall back to name search.
        assert_eq!(resolve_overload(mix, None, "A", SocketDir::Input), None);
        assert_eq!(
            resolve_overload(mix, Some("RGBA"), "Vector", SocketDir::Input),
            None
        );
    }

    #[test]
    fn visibility_follows_selector_set() {
        let cat = catalog().unwrap();
        let mix = cat.descriptor("ShaderNodeMix").unwrap();
        let mut rt = MemoryRuntime::new().unwrap();
        let node = rt.create_node("ShaderNodeMix").unwrap();
        apply_socket_visibility(&mut rt, node, mix, "RGBA").unwrap();
        let inputs = rt.input_sockets(node);
        for (i, s) in inputs.iter().enumerate() {
            let expect_visible = [0, 6, 7].contains(&i);
            assert_eq!(!s.hidden, expect_visible, "socket {i}");
        }
    }
}
