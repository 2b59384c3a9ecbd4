use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use ruta::graph::{Edge, Graph, NodeId, TraverseOptions};
use std::collections::HashMap;
use std::fs;

/// Checks that a randomized item placement is completable, and prints the
/// order in which everything becomes reachable.
#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML file describing the placement graph to check.
    file: String,

    /// Explore depth-first instead of breadth-first. The outcome is the
    /// same either way; only the printed order changes.
    #[arg(long, default_value_t = false)]
    dfs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let contents = fs::read_to_string(&args.file)
        .with_context(|| format!("could not read '{}'", args.file))?;
    let (graph, wanted) = parse_graph(&contents)?;

    let traversal = graph.traverse(&TraverseOptions {
        wanted: Some(wanted.clone()),
        dfs: args.dfs,
    });

    for (i, (_, rendered)) in traversal.path.iter().enumerate() {
        println!("#{:<4} {}", i + 1, rendered);
    }

    if traversal.win {
        println!("all {} wanted nodes are reachable", wanted.len());
        Ok(())
    } else {
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|uid| !traversal.seen.contains_key(*uid))
            .map(|&uid| graph.name(uid))
            .collect();
        eprintln!("error: {} wanted node(s) cannot be reached: {}", missing.len(), missing.join(", "));
        std::process::exit(1);
    }
}

/// Parses a graph description:
///
/// ```toml
/// wanted = ["Boss"]
///
/// [[node]]
/// name = "Start"
///
/// [[edge]]
/// target = "Boss"
/// needs = ["Start"]
/// ```
///
/// An edge without a `needs` list makes its target always reachable, and a
/// node is only a name until some edge reaches it.
fn parse_graph(contents: &str) -> Result<(Graph, Vec<NodeId>)> {
    let table: toml::Table = contents.parse().context("malformed graph file")?;

    let mut graph = Graph::new();
    let mut uids: HashMap<String, NodeId> = HashMap::new();

    let Some(nodes) = table.get("node").and_then(toml::Value::as_array) else {
        bail!("the graph does not declare any 'node' entries");
    };
    for (i, value) in nodes.iter().enumerate() {
        let Some(name) = value.as_table().and_then(|t| t.get("name")).and_then(toml::Value::as_str)
        else {
            bail!("node #{} is missing its 'name'", i + 1);
        };
        if uids.contains_key(name) {
            bail!("node '{}' is declared twice", name);
        }
        let uid = graph.node(name);
        uids.insert(name.to_string(), uid);
    }

    let lookup = |name: &str| -> Result<NodeId> {
        uids.get(name)
            .copied()
            .with_context(|| format!("'{}' is not a declared node", name))
    };

    if let Some(edges) = table.get("edge").and_then(toml::Value::as_array) {
        for (i, value) in edges.iter().enumerate() {
            let Some(entry) = value.as_table() else {
                bail!("edge #{} is not a table", i + 1);
            };
            let Some(target) = entry.get("target").and_then(toml::Value::as_str) else {
                bail!("edge #{} is missing its 'target'", i + 1);
            };
            let mut tuple = vec![lookup(target)?];
            if let Some(needs) = entry.get("needs").and_then(toml::Value::as_array) {
                for need in needs {
                    let Some(name) = need.as_str() else {
                        bail!("edge #{}: 'needs' has to be a list of node names", i + 1);
                    };
                    tuple.push(lookup(name)?);
                }
            }
            graph.add_edge(Edge::of(&tuple));
        }
    }

    let wanted = match table.get("wanted").and_then(toml::Value::as_array) {
        Some(list) => {
            let mut ret = Vec::with_capacity(list.len());
            for value in list {
                let Some(name) = value.as_str() else {
                    bail!("'wanted' has to be a list of node names");
                };
                ret.push(lookup(name)?);
            }
            ret
        }
        // With no explicit list, everything is wanted.
        None => (0..graph.nodes().len()).collect(),
    };

    Ok((graph, wanted))
}
