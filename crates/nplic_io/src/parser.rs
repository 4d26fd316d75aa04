//! Parser for scenario script files.
//!
//! Grammar, one statement per line:
//!
//! ```text
//! threshold <n>
//! source <id> priority <n> [unhandled]
//! on <id> raise <id>
//! raise <id>
//! ```
//!
//! `threshold` sets the controller threshold before interrupts are enabled.
//! `source` programs a priority and enables the line; `unhandled` leaves the
//! handler table slot empty. `on X raise Y` makes the handler of `X` raise `Y`
//! the first time it runs. `raise` lines are replayed in order once
//! everything is wired. A source must be declared before it is referenced.

use anyhow::{Result, anyhow, bail};
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{space1, u32 as decimal};
use nom::combinator::{all_consuming, map, opt};
use nom::sequence::{preceded, tuple};

use nplic_common::plic::{PRIORITY_MAX, SOURCE_COUNT};
use nplic_core::sim::REACTION_CAPACITY;
use nplic_core::{Priority, SourceId};

/// A declared interrupt source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDecl {
    pub id: SourceId,
    pub priority: Priority,
    /// Whether a handler is registered for the source.
    pub handled: bool,
}

/// "While handling `trigger`, raise `raise`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction {
    pub trigger: SourceId,
    pub raise: SourceId,
}

/// A parsed and validated scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub threshold: Priority,
    pub sources: Vec<SourceDecl>,
    pub reactions: Vec<Reaction>,
    pub raises: Vec<SourceId>,
}

impl Script {
    pub fn source(&self, id: SourceId) -> Option<&SourceDecl> {
        self.sources.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    Threshold(Priority),
    Source(SourceDecl),
    On(Reaction),
    Raise(SourceId),
}

fn threshold(input: &str) -> IResult<&str, Statement> {
    map(
        preceded(tuple((tag("threshold"), space1)), decimal),
        Statement::Threshold,
    )(input)
}

fn source(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            tag("source"),
            space1,
            decimal,
            space1,
            tag("priority"),
            space1,
            decimal,
            opt(preceded(space1, tag("unhandled"))),
        )),
        |(_, _, id, _, _, _, priority, unhandled)| {
            Statement::Source(SourceDecl {
                id,
                priority,
                handled: unhandled.is_none(),
            })
        },
    )(input)
}

fn reaction(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            tag("on"),
            space1,
            decimal,
            space1,
            tag("raise"),
            space1,
            decimal,
        )),
        |(_, _, trigger, _, _, _, raise)| Statement::On(Reaction { trigger, raise }),
    )(input)
}

fn raise(input: &str) -> IResult<&str, Statement> {
    map(preceded(tuple((tag("raise"), space1)), decimal), Statement::Raise)(input)
}

fn statement(input: &str) -> IResult<&str, Statement> {
    all_consuming(alt((threshold, source, reaction, raise)))(input)
}

fn check_id(script: &Script, id: SourceId) -> Result<()> {
    if id == 0 || id as usize >= SOURCE_COUNT {
        bail!("source {} outside 1..{}", id, SOURCE_COUNT);
    }
    if script.source(id).is_none() {
        bail!("source {} used before its declaration", id);
    }
    Ok(())
}

fn check_priority(what: &str, value: Priority) -> Result<()> {
    if value > PRIORITY_MAX {
        bail!("{} {} exceeds {}", what, value, PRIORITY_MAX);
    }
    Ok(())
}

fn apply(script: &mut Script, statement: Statement) -> Result<()> {
    match statement {
        Statement::Threshold(t) => {
            check_priority("threshold", t)?;
            script.threshold = t;
        }
        Statement::Source(decl) => {
            if decl.id == 0 || decl.id as usize >= SOURCE_COUNT {
                bail!("source {} outside 1..{}", decl.id, SOURCE_COUNT);
            }
            if script.source(decl.id).is_some() {
                bail!("source {} declared twice", decl.id);
            }
            check_priority("priority", decl.priority)?;
            script.sources.push(decl);
        }
        Statement::On(r) => {
            check_id(script, r.trigger)?;
            check_id(script, r.raise)?;
            if script.reactions.len() == REACTION_CAPACITY {
                bail!("more than {} reactions", REACTION_CAPACITY);
            }
            script.reactions.push(r);
        }
        Statement::Raise(id) => {
            check_id(script, id)?;
            script.raises.push(id);
        }
    }
    Ok(())
}

/// Parses a scenario script.
///
/// # Arguments
///
/// * `text` - Script contents
///
/// # Returns
///
/// The validated script, or an error naming the first offending line.
pub fn parse_script(text: &str) -> Result<Script> {
    let mut script = Script::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let (_, stmt) =
            statement(line).map_err(|_| anyhow!("line {}: cannot parse `{}`", index + 1, line))?;
        apply(&mut script, stmt).map_err(|e| anyhow!("line {}: {}", index + 1, e))?;
    }

    Ok(script)
}
