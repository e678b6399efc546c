//! The per-layer table: the network's module tree, one line per module, each carrying its
//! params and MACs together with their shares of the total.

use std::io::Write;

use model::{LayerId, Network};

use crate::{Result, engine::Profile, groups::Counts, units::Formatting};

/// A node of the module tree, named by one path segment.
#[derive(Debug, Default)]
struct Module {
    name: String,
    layer: Option<LayerId>,
    children: Vec<Module>,
}

impl Module {
    fn insert(&mut self, segments: &[&str], id: LayerId) {
        let Some((first, rest)) = segments.split_first() else {
            self.layer = Some(id);
            return;
        };

        let pos = match self.children.iter().position(|c| c.name == *first) {
            Some(pos) => pos,
            None => {
                self.children.push(Module {
                    name: first.to_string(),
                    ..Default::default()
                });
                self.children.len() - 1
            }
        };
        self.children[pos].insert(rest, id);
    }

    /// Per-sample counts and calls of this module and everything below it.
    fn totals(&self, network: &Network, profile: &Profile) -> (Counts, usize) {
        let (mut counts, calls) = self.batch_totals(network, profile);
        counts.forward /= profile.batch_size();
        counts.backward /= profile.batch_size();
        (counts, calls)
    }

    fn batch_totals(&self, network: &Network, profile: &Profile) -> (Counts, usize) {
        let mut counts = Counts::default();
        let mut calls = 0;

        if let Some(id) = self.layer {
            let stats = profile.batch_layer(id);
            counts += Counts {
                forward: stats.forward,
                backward: stats.backward,
                params: network.layer(id).map_or(0, |e| e.trainable_params()),
            };
            calls += stats.calls;
        }
        for child in &self.children {
            let (c, n) = child.batch_totals(network, profile);
            counts += c;
            calls += n;
        }

        (counts, calls)
    }
}

fn module_tree(network: &Network) -> Module {
    let mut root = Module::default();
    for (id, entry) in network.entries() {
        let segments: Vec<_> = entry.path().split('.').collect();
        root.insert(&segments, id);
    }
    root
}

fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 { 100.0 * part / total } else { 0.0 }
}

struct Printer<'a> {
    network: &'a Network,
    profile: &'a Profile,
    total: Counts,
    fmt: Formatting,
}

impl Printer<'_> {
    fn stats(&self, counts: &Counts) -> String {
        format!(
            "{}, {:.3}% Params, {}, {:.3}% MACs, {} backward",
            self.fmt.params(counts.params),
            share(counts.params as f64, self.total.params as f64),
            self.fmt.flops(counts.forward),
            share(counts.forward as f64, self.total.forward as f64),
            self.fmt.flops(counts.backward),
        )
    }

    fn module(&self, out: &mut dyn Write, module: &Module, depth: usize) -> Result<()> {
        let indent = "  ".repeat(depth);
        let (counts, calls) = module.totals(self.network, self.profile);
        let mut line = format!("{indent}({}): ", module.name);

        match module.layer.and_then(|id| self.network.layer(id)) {
            Some(entry) => {
                let layer = entry.layer();
                line += &format!("{}({}", layer.type_name(), self.stats(&counts));
                let repr = layer.to_string();
                if !repr.is_empty() {
                    line += &format!(", {repr}");
                }
            }
            None => line += &format!("Module({}", self.stats(&counts)),
        }
        if calls != 1 && module.children.is_empty() {
            line += &format!(", calls={calls}");
        }

        if module.children.is_empty() {
            writeln!(out, "{line})")?;
            return Ok(());
        }

        writeln!(out, "{line},")?;
        for child in &module.children {
            self.module(out, child, depth + 1)?;
        }
        writeln!(out, "{indent})")?;
        Ok(())
    }
}

/// Writes the per-layer table of a profiled network to `out`.
///
/// Containers are the path prefixes shared by several layers and sum everything below them.
/// A layer called more than once shows how many times it ran.
///
/// # Arguments
/// * `network` - The profiled network.
/// * `profile` - Its counts.
/// * `fmt` - How to print them.
/// * `out` - Where the table goes.
pub fn print_model_with_flops(
    network: &Network,
    profile: &Profile,
    fmt: Formatting,
    out: &mut dyn Write,
) -> Result<()> {
    let total = profile.total(network);
    let printer = Printer {
        network,
        profile,
        total,
        fmt,
    };

    writeln!(out, "Network({},", printer.stats(&total))?;
    for child in &module_tree(network).children {
        printer.module(out, child, 1)?;
    }
    writeln!(out, ")")?;

    Ok(())
}
