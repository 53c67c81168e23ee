//! Interactive commands read from stdin.

use rst_core::{NodeId, NodeIdError, NodeState};
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  flood                 announce neighbours and discover the graph
  start                 start a wave with this node as root
  ping <id>             send a ping to any node
  show <field>          neighbours | proc_known | channels_known | parent |
                        children | valset | expected | pending | state
  help                  show this text
  exit                  stop the node";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Neighbours,
    ProcessesKnown,
    ChannelsKnown,
    Parent,
    Children,
    ValueSet,
    Expected,
    Pending,
    State,
}

impl FromStr for Field {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neighbours" | "neighbors" => Ok(Self::Neighbours),
            "proc_known" => Ok(Self::ProcessesKnown),
            "channels_known" => Ok(Self::ChannelsKnown),
            "parent" => Ok(Self::Parent),
            "children" => Ok(Self::Children),
            "valset" => Ok(Self::ValueSet),
            "expected" => Ok(Self::Expected),
            "pending" => Ok(Self::Pending),
            "state" => Ok(Self::State),
            other => Err(CommandError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Flood,
    Start,
    Ping(NodeId),
    Show(Field),
    Help,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("no command found for '{0}' (try 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown field '{0}' (try 'help')")]
    UnknownField(String),

    #[error("invalid node ID: {0}")]
    InvalidId(#[from] NodeIdError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::Usage("<command> [args]"));
        };
        let arg = words.next();
        let extra = words.next().is_some();

        let command = match (name, arg) {
            ("flood", None) => Self::Flood,
            ("start", None) => Self::Start,
            ("ping", Some(peer)) => Self::Ping(peer.parse()?),
            ("ping", None) => return Err(CommandError::Usage("ping <id>")),
            ("show", Some(field)) => Self::Show(field.parse()?),
            ("show", None) => return Err(CommandError::Usage("show <field>")),
            ("help", None) => Self::Help,
            ("exit", None) => Self::Exit,
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        };
        if extra {
            return Err(CommandError::Unknown(line.trim().to_string()));
        }
        Ok(command)
    }
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render one field of `state` for the console.
pub fn render(field: Field, state: &NodeState) -> String {
    match field {
        Field::Neighbours => join(state.neighbours()),
        Field::ProcessesKnown => join(state.processes_known()),
        Field::ChannelsKnown => join(state.sorted_channels()),
        Field::Parent => state
            .parent()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "none".to_string()),
        Field::Children => join(state.children()),
        Field::ValueSet => {
            let mut out = String::new();
            for pair in state.value_set() {
                let _ = write!(out, "{}={} ", pair.origin, pair.value);
            }
            out.trim_end().to_string()
        }
        Field::Expected => state.expected_replies().to_string(),
        Field::Pending => join(state.pending_replies()),
        Field::State => serde_json::to_string_pretty(&state.snapshot())
            .unwrap_or_else(|e| format!("failed to serialize state: {e}")),
    }
}
