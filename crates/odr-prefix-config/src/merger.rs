//! Linked descendant merger options.
//!
//! Grammar of `plugin_config`:
//!
//! ```text
//! config := group ( '|' group )*
//! group  := prefix ( ',' prefix )* ':' prefix
//! prefix := id ( '_' id )*
//! ```
//!
//! Each group names the source prefixes whose records get pulled out of the
//! tree and the destination prefix they are all moved under. The
//! destination must be one of the sources and there must be at least two
//! sources; groups breaking either rule are skipped.

use crate::ConfigError;
use nom::{
    character::complete::{char as pchar, digit1, multispace0},
    combinator::{all_consuming, map_res, recognize},
    multi::separated_list1,
    sequence::{delimited, separated_pair},
    IResult,
};
use odr_prefix_core::PrefixPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub sources: Vec<PrefixPath>,
    pub destination: PrefixPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergerConfig {
    pub groups: Vec<MergeGroup>,
    /// Groups that parsed but were rejected, with the reason.
    #[serde(default)]
    pub skipped: Vec<(String, String)>,
}

impl MergerConfig {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let mut config = Self::default();
        for raw in trimmed.split('|') {
            let group = parse_group(raw)?;
            match validate_group(&group) {
                Ok(()) => config.groups.push(group),
                Err(reason) => config.skipped.push((raw.trim().to_string(), reason)),
            }
        }
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl std::fmt::Display for MergeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<String> = self.sources.iter().map(|p| p.to_string()).collect();
        write!(f, "{}:{}", sources.join(","), self.destination)
    }
}

fn prefix(input: &str) -> IResult<&str, PrefixPath> {
    map_res(
        delimited(
            multispace0,
            recognize(separated_list1(pchar('_'), digit1)),
            multispace0,
        ),
        PrefixPath::parse,
    )(input)
}

fn group(input: &str) -> IResult<&str, MergeGroup> {
    let (input, (sources, destination)) =
        separated_pair(separated_list1(pchar(','), prefix), pchar(':'), prefix)(input)?;
    Ok((
        input,
        MergeGroup {
            sources,
            destination,
        },
    ))
}

fn parse_group(raw: &str) -> Result<MergeGroup, ConfigError> {
    all_consuming(group)(raw)
        .map(|(_, g)| g)
        .map_err(|_| {
            ConfigError::invalid(
                "plugin_config",
                format!("`{}` should look like `src1,src2:dest`", raw.trim()),
            )
        })
}

fn validate_group(group: &MergeGroup) -> Result<(), String> {
    if group.sources.len() < 2 {
        return Err("needs at least two source prefixes".to_string());
    }
    if !group.sources.contains(&group.destination) {
        return Err("destination must be one of the sources".to_string());
    }
    Ok(())
}
