use anyhow::{Context, bail};
use vista_graph::ObjectGraph;
use vista_ids::ObjectId;
use vista_variant::Variant;

use crate::registry::TypeRegistry;

/// Load a scene description into the graph, returning the root objects it
/// created. The format is line-based: one directive per line, blocks
/// closed with `end`:
///
/// ```text
/// object Rectangle frame
///   prop width = 640
///   prop color = "#204060"
///   bind height = width / 2
///   object Text label
///     prop text = "hello"
///     bind font_size = parent.height / 4 when parent.height > 0
///   end
/// end
/// ```
///
/// `prop` values are JSON literals; `bind` right-hand sides are expression
/// sources handed to the graph verbatim. This is a loader for the binding
/// graph's inputs, not a markup language.
pub fn load_scene(
    graph: &mut ObjectGraph,
    registry: &TypeRegistry,
    source: &str,
) -> anyhow::Result<Vec<ObjectId>> {
    let mut roots = Vec::new();
    let mut stack: Vec<ObjectId> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let lineno = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (directive, rest) = match line.split_once(char::is_whitespace) {
            Some((d, r)) => (d, r.trim()),
            None => (line, ""),
        };

        match directive {
            "object" => {
                let mut parts = rest.split_whitespace();
                let (Some(type_name), Some(object_name)) = (parts.next(), parts.next()) else {
                    bail!("line {lineno}: expected 'object <Type> <name>'");
                };
                if parts.next().is_some() {
                    bail!("line {lineno}: trailing tokens after object name");
                }
                let parent = stack.last().copied().unwrap_or(ObjectId::nil());
                let id = registry
                    .create(graph, type_name, parent, object_name)
                    .with_context(|| format!("line {lineno}"))?;
                if parent.is_nil() {
                    roots.push(id);
                }
                stack.push(id);
            }

            "prop" => {
                let Some(owner) = stack.last().copied() else {
                    bail!("line {lineno}: 'prop' outside an object block");
                };
                let Some((name, literal)) = rest.split_once('=') else {
                    bail!("line {lineno}: expected 'prop <name> = <literal>'");
                };
                let value = parse_literal(literal.trim())
                    .with_context(|| format!("line {lineno}: bad literal"))?;
                graph
                    .write(owner, name.trim(), value)
                    .with_context(|| format!("line {lineno}"))?;
            }

            "bind" => {
                let Some(owner) = stack.last().copied() else {
                    bail!("line {lineno}: 'bind' outside an object block");
                };
                let Some((name, expr)) = rest.split_once('=') else {
                    bail!("line {lineno}: expected 'bind <name> = <expression>'");
                };
                let expr = expr.trim();
                // Optional trailing guard: `bind p = <expr> when <guard>`.
                let result = match expr.rsplit_once(" when ") {
                    Some((body, guard)) => {
                        graph.set_binding_when(owner, name.trim(), body.trim(), guard.trim())
                    }
                    None => graph.set_binding(owner, name.trim(), expr),
                };
                result.with_context(|| format!("line {lineno}"))?;
            }

            "end" => {
                if stack.pop().is_none() {
                    bail!("line {lineno}: 'end' without an open object block");
                }
            }

            other => bail!("line {lineno}: unknown directive '{other}'"),
        }
    }

    if let Some(open) = stack.last() {
        bail!(
            "unclosed object block ({})",
            graph
                .object(*open)
                .map(|o| o.name.to_string())
                .unwrap_or_default()
        );
    }
    Ok(roots)
}

fn parse_literal(text: &str) -> anyhow::Result<Variant> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(Variant::from_json_value(json))
}
