use indexmap::IndexMap;
use regex_lite::Regex;

use crate::errors::{FabricError, Result};

/// `[name]`, `[name:children]` or `[name:vars]`
const SECTION_PATTERN: &str = r"^\[\s*([^\]:\s]+)\s*(?::\s*(\w+)\s*)?\]$";

enum Section {
    Hosts(String),
    Children(String),
    Ignored,
}

/// Parse an Ansible-style INI inventory into `group -> hosts`.
///
/// Host variables after the host name and `:vars` sections are ignored.
/// Child groups are flattened into their parents.
pub fn parse(text: &str) -> Result<IndexMap<String, Vec<String>>> {
    let section_re = Regex::new(SECTION_PATTERN).map_err(|e| FabricError::invalid_topology(e.to_string()))?;

    let mut hosts: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut children: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut section = Section::Hosts("ungrouped".to_string());

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            let caps = section_re.captures(line).ok_or_else(|| {
                FabricError::invalid_topology(format!("inventory line {}: bad section '{}'", lineno + 1, line))
            })?;
            let name = caps[1].to_string();
            section = match caps.get(2).map(|m| m.as_str()) {
                None => {
                    hosts.entry(name.clone()).or_default();
                    Section::Hosts(name)
                }
                Some("children") => {
                    hosts.entry(name.clone()).or_default();
                    Section::Children(name)
                }
                Some(_) => Section::Ignored,
            };
            continue;
        }

        let Some(token) = line.split_whitespace().next() else { continue };
        match &section {
            Section::Hosts(group) => {
                let members = hosts.entry(group.clone()).or_default();
                if !members.iter().any(|h| h == token) {
                    members.push(token.to_string());
                }
            }
            Section::Children(group) => {
                children.entry(group.clone()).or_default().push(token.to_string());
            }
            Section::Ignored => {}
        }
    }

    let direct = hosts.clone();
    for group in hosts.keys().cloned().collect::<Vec<_>>() {
        let mut stack = vec![group.clone()];
        let mut seen = vec![group.clone()];
        let mut members: Vec<String> = Vec::new();

        while let Some(current) = stack.pop() {
            for host in direct.get(&current).into_iter().flatten() {
                if !members.contains(host) {
                    members.push(host.clone());
                }
            }
            // reversed so children are visited in declaration order
            for child in children.get(&current).into_iter().flatten().rev() {
                if !direct.contains_key(child) {
                    return Err(FabricError::invalid_topology(format!(
                        "inventory group '{}' lists unknown child group '{}'",
                        current, child
                    )));
                }
                if !seen.contains(child) {
                    seen.push(child.clone());
                    stack.push(child.clone());
                }
            }
        }
        hosts.insert(group, members);
    }

    if hosts.get("ungrouped").is_some_and(|h| h.is_empty()) {
        hosts.shift_remove("ungrouped");
    }
    Ok(hosts)
}
