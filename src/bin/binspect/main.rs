#![doc = include_str!("../../../README.md")]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use binspect::{compile, Evaluated, Node, NodeKind, Tree, Value};

mod args;
use args::CommandLineArgs;

fn init_logger(verbosity: u8) {
    let sub = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(false)
        .with_line_number(false);
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    sub.with_max_level(level).init();
}

fn main() -> Result<()> {
    let CommandLineArgs {
        spec,
        data,
        eval,
        json,
        limit,
        verbose,
    } = CommandLineArgs::parse();

    init_logger(verbose);

    let spec_text = std::fs::read_to_string(&spec)
        .with_context(|| format!("Failed to read spec from: {spec}"))?;
    let schema = compile(&spec_text).with_context(|| format!("Failed to compile: {spec}"))?;
    let bytes =
        std::fs::read(&data).with_context(|| format!("Failed to read data from: {data}"))?;
    let tree = Tree::open(bytes, Arc::new(schema))
        .with_context(|| format!("Failed to bind {spec} to {data}"))?;

    if eval.is_empty() {
        let limit = if limit == 0 { u64::MAX } else { limit as u64 };
        if json {
            let dumped = dump_json(&tree.root(), limit)?;
            println!("{}", serde_json::to_string_pretty(&dumped)?);
        } else {
            print_node(&tree.root(), "file", 0, limit)?;
        }
    } else {
        for expr in &eval {
            match tree.eval(expr)? {
                Evaluated::Value(value) => println!("{expr} = {value}"),
                Evaluated::Node(node) => match node.value() {
                    Ok(value) => println!("{expr} = {value}"),
                    Err(_) => {
                        let (offset, length) = node.location()?;
                        println!("{expr} = {:?} [{offset}, +{length}]", node.kind()?)
                    }
                },
            }
        }
    }
    Ok(())
}

fn print_node(node: &Node, name: &str, depth: usize, limit: u64) -> Result<()> {
    let indent = depth * 2;
    match node.kind()? {
        NodeKind::Struct => {
            let (offset, length) = node.location()?;
            println!("{0:indent$}{name}: struct [{offset}, +{length}]", "");
            for (label, child) in node.entries()? {
                print_node(&child, &label, depth + 1, limit)?;
            }
        }
        NodeKind::Array => {
            let len = node.len()?;
            let (offset, length) = node.location()?;
            println!("{0:indent$}{name}: [{len}] [{offset}, +{length}]", "");
            for (i, child) in node.iter()?.enumerate() {
                if (i as u64) >= limit {
                    println!("{0:indent$}  ... {1} more", "", len - limit);
                    break;
                }
                print_node(&child, &format!("[{i}]"), depth + 1, limit)?;
            }
        }
        NodeKind::Bytes => {
            let bytes = node.as_bytes()?;
            let shown: String = bytes
                .iter()
                .take(24)
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            let ellipsis = if bytes.len() > 24 { " ..." } else { "" };
            println!(
                "{0:indent$}{name}: {1} bytes <{shown}{ellipsis}>",
                "",
                bytes.len()
            );
        }
        _ => {
            println!("{0:indent$}{name}: {1}", "", node.value()?);
        }
    }
    Ok(())
}

fn dump_json(node: &Node, limit: u64) -> Result<serde_json::Value> {
    use serde_json::Value as Json;
    Ok(match node.kind()? {
        NodeKind::Struct => {
            let mut object = serde_json::Map::new();
            for (label, child) in node.entries()? {
                object.insert(label, dump_json(&child, limit)?);
            }
            Json::Object(object)
        }
        NodeKind::Array => {
            let mut items = Vec::new();
            for (i, child) in node.iter()?.enumerate() {
                if (i as u64) >= limit {
                    break;
                }
                items.push(dump_json(&child, limit)?);
            }
            Json::Array(items)
        }
        NodeKind::Bytes => {
            let hex: String = node.as_bytes()?.iter().map(|b| format!("{b:02x}")).collect();
            Json::String(hex)
        }
        _ => match node.value()? {
            Value::Integer(v) => match i64::try_from(v) {
                Ok(v) => Json::Number(v.into()),
                Err(_) => Json::String(v.to_string()),
            },
            Value::Bool(b) => Json::Bool(b),
            Value::String(s) => Json::String(s),
            Value::Bytes(b) => Json::String(b.iter().map(|b| format!("{b:02x}")).collect()),
        },
    })
}
