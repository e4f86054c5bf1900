use crate::{emit_success, OutputMode};
use jarscope::bridge::WorkspaceTypeSolver;
use jarscope::config::{write_config, JarscopeConfig};
use jarscope::graph::{BlockGraph, CallEdge, Dispatch};
use jarscope::ui::{self, dim, layer_badge, layers_table, muted, section, stats_table, success, Icons};
use jarscope::unit::to_internal_name;
use jarscope::{MethodRef, Workspace};
use owo_colors::OwoColorize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Map a user-supplied type name to the unit it denotes, nested classes included
fn type_name(workspace: &Workspace, name: &str) -> String {
    WorkspaceTypeSolver::new(workspace)
        .resolve_name(name)
        .unwrap_or_else(|| to_internal_name(name))
}

pub fn run_init(mode: OutputMode, path: &Path, config: &JarscopeConfig, force: bool) -> anyhow::Result<()> {
    write_config(path, config, force)?;
    if mode.is_human() {
        success(&format!("Wrote {}", path.display()));
    }
    emit_success(mode, "init", serde_json::json!({ "path": path, "config": config }))
}

pub fn run_layers(mode: OutputMode, workspace: &Workspace) -> anyhow::Result<()> {
    if mode.is_human() {
        ui::header("Resolution order");
        println!("{}", layers_table(workspace));
        return Ok(());
    }
    let layers: Vec<_> = workspace
        .layers()
        .map(|layer| {
            serde_json::json!({
                "name": layer.name(),
                "kind": layer.kind(),
                "units": layer.unit_count(),
                "resources": layer.resource_count(),
            })
        })
        .collect();
    emit_success(mode, "layers", layers)
}

pub fn run_resolve(mode: OutputMode, workspace: &Workspace, name: &str) -> anyhow::Result<()> {
    let unit = type_name(workspace, name);
    let (found, layer) = match workspace.resolve_containing_layer(&unit) {
        Some(layer) => (unit, Some(layer)),
        None => (name.to_string(), workspace.layers().find(|l| l.contains_resource(name))),
    };

    if mode.is_human() {
        match layer {
            Some(layer) => ui::status(Icons::PACKAGE, &found, &format!("{} {}", layer_badge(layer.kind()), layer.name())),
            None => ui::warn(&format!("{} not found in any layer", name)),
        }
        return Ok(());
    }
    emit_success(
        mode,
        "resolve",
        serde_json::json!({
            "name": found,
            "layer": layer.map(|l| l.name()),
            "kind": layer.map(|l| l.kind()),
        }),
    )
}

fn print_types(workspace: &Workspace, names: &BTreeSet<String>) {
    let graph = workspace.hierarchy_graph();
    if names.is_empty() {
        println!("{}", muted("  (none)"));
    }
    for name in names {
        match graph.node(name) {
            Some(node) => println!("  {} {}", layer_badge(node.layer), name),
            None => println!("  {} {}", "[dangling]".style(ui::theme().warn), name),
        }
    }
}

pub fn run_parents(mode: OutputMode, workspace: &Workspace, name: &str, all: bool) -> anyhow::Result<()> {
    let name = type_name(workspace, name);
    let graph = workspace.hierarchy_graph();
    let parents: BTreeSet<String> = if all {
        graph.all_parents(&name)?
    } else {
        if let Some(e) = graph.decode_failure(&name) {
            return Err(e.clone().into());
        }
        graph.direct_parents(&name).into_iter().map(str::to_string).collect()
    };

    if mode.is_human() {
        section(&format!(" {} Supertypes of {} ", Icons::UP, name));
        print_types(workspace, &parents);
        return Ok(());
    }
    emit_success(mode, "parents", serde_json::json!({ "name": name, "parents": parents }))
}

pub fn run_children(mode: OutputMode, workspace: &Workspace, name: &str, all: bool) -> anyhow::Result<()> {
    let name = type_name(workspace, name);
    let graph = workspace.hierarchy_graph();
    let children: BTreeSet<String> = if all {
        graph.all_children(&name)?
    } else {
        graph.direct_children(&name).into_iter().map(str::to_string).collect()
    };

    if mode.is_human() {
        section(&format!(" {} Subtypes of {} ", Icons::DOWN, name));
        print_types(workspace, &children);
        return Ok(());
    }
    emit_success(mode, "children", serde_json::json!({ "name": name, "children": children }))
}

fn print_edge(edge: &CallEdge, target: &MethodRef) {
    let dispatch = match edge.dispatch {
        Dispatch::Direct => dim("direct"),
        Dispatch::Override => dim("override"),
    };
    let marker = if edge.is_dangling() {
        format!(" {}", "(unresolved)".style(ui::theme().warn))
    } else {
        String::new()
    };
    println!("  @{:<5} {:<16} {} {}{}", edge.offset, edge.kind.as_str(), dispatch, target, marker);
}

fn print_blocks(blocks: &BlockGraph) {
    section(" Basic blocks ");
    for block in blocks.blocks() {
        let successors: Vec<String> = blocks.successors(block.index).iter().map(|s| format!("B{}", s)).collect();
        println!(
            "  B{:<3} [{}..{})  {} {}",
            block.index,
            block.start,
            block.end,
            Icons::RIGHT,
            if successors.is_empty() { muted("exit") } else { successors.join(", ") }
        );
    }
}

pub fn run_calls(mode: OutputMode, workspace: &Workspace, method: &str, blocks: bool) -> anyhow::Result<()> {
    let method: MethodRef = method.parse()?;
    let owner = type_name(workspace, &method.owner);
    let flow = workspace.flow_graph();
    let Some(node) = flow.flow_for(&owner, &method.name, &method.descriptor)? else {
        anyhow::bail!("no method {} in the project layers", method);
    };

    if mode.is_human() {
        section(&format!(" {} Calls from {} ", Icons::LINK, node.method()));
        if node.calls().is_empty() && node.dynamic_sites().is_empty() {
            println!("{}", muted("  (none)"));
        }
        for edge in node.calls() {
            print_edge(edge, &edge.callee);
        }
        for site in node.dynamic_sites() {
            println!("  @{:<5} {} {}{}", site.offset, Icons::BOLT, site.name, site.descriptor);
        }
        if blocks {
            print_blocks(node.blocks());
        }
        return Ok(());
    }

    let mut data = serde_json::json!({
        "method": node.method(),
        "calls": node.calls(),
        "dynamic_sites": node.dynamic_sites(),
    });
    if blocks {
        data["blocks"] = serde_json::to_value(node.blocks())?;
    }
    emit_success(mode, "calls", data)
}

pub fn run_callers(mode: OutputMode, workspace: &Workspace, method: &str) -> anyhow::Result<()> {
    let mut method: MethodRef = method.parse()?;
    method.owner = type_name(workspace, &method.owner);
    let flow = workspace.flow_graph();
    let callers = flow.callers_of(&method);

    if mode.is_human() {
        section(&format!(" {} Callers of {} ", Icons::LEFT, method));
        if callers.is_empty() {
            println!("{}", muted("  (none)"));
        }
        for edge in callers {
            print_edge(edge, &edge.caller);
        }
        return Ok(());
    }
    emit_success(mode, "callers", serde_json::json!({ "method": method, "callers": callers }))
}

pub fn run_dangling(mode: OutputMode, workspace: &Workspace) -> anyhow::Result<()> {
    let graph = workspace.hierarchy_graph();
    let edges = graph.dangling_edges();

    if mode.is_human() {
        section(&format!(" {} Dangling references ", Icons::WARN));
        if edges.is_empty() {
            success("Every supertype resolves");
        }
        for edge in edges {
            println!("  {} {} {} {}", edge.child, dim(edge.kind.as_str()), Icons::RIGHT, edge.parent);
        }
        return Ok(());
    }
    emit_success(mode, "dangling", edges)
}

pub fn run_stats(mode: OutputMode, workspace: &Workspace) -> anyhow::Result<()> {
    let started = Instant::now();
    let hierarchy = workspace.hierarchy_graph();
    let flow = workspace.flow_graph();
    let (h, f) = (hierarchy.stats(), flow.stats());

    if mode.is_human() {
        ui::header("Workspace statistics");
        println!(
            "{}",
            stats_table(&[
                ("Layers", workspace.layers().count().to_string()),
                ("Project units", workspace.all_unit_names().len().to_string()),
                ("Types", format!("{} ({} runtime)", h.types, h.runtime_types)),
                ("Hierarchy edges", format!("{} ({} dangling)", h.edges, h.dangling_edges)),
                ("Methods", f.methods.to_string()),
                ("Direct calls", format!("{} ({} unresolved)", f.direct_edges, f.unresolved_edges)),
                ("Override edges", f.override_edges.to_string()),
                ("Dynamic sites", f.dynamic_sites.to_string()),
                ("Decode failures", h.decode_failures.to_string()),
            ])
        );
        ui::timing(&format!("{:.2?}", started.elapsed()));
        return Ok(());
    }
    emit_success(mode, "stats", serde_json::json!({ "hierarchy": h, "flow": f }))
}

pub fn run_snapshot(mode: OutputMode, workspace: &mut Workspace, out: Option<PathBuf>, timeout: u64) -> anyhow::Result<()> {
    if let Some(out) = out {
        workspace.set_snapshot_path(out);
    }
    workspace.on_primary_definition_changes(HashSet::new());
    if !workspace.wait_for_snapshot(Duration::from_secs(timeout)) {
        anyhow::bail!("snapshot did not finish within {}s", timeout);
    }
    if let Some(e) = workspace.tracker().exporter().last_error() {
        anyhow::bail!("snapshot failed: {}", e);
    }

    let path = workspace.snapshot_path().to_path_buf();
    if mode.is_human() {
        ui::status(
            Icons::DISK,
            "Snapshot",
            &format!("{} ({} units)", path.display(), workspace.primary().unit_count()),
        );
        return Ok(());
    }
    emit_success(
        mode,
        "snapshot",
        serde_json::json!({ "path": path, "units": workspace.primary().unit_count() }),
    )
}
