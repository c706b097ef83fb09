//! Instruction text sent alongside the audio.

use crate::preset::Preset;
use crate::tuning::TUNING_FIELDS;

pub fn preset_instruction() -> String {
    let names: Vec<String> = Preset::ALL.iter().map(|p| format!("'{p}'")).collect();
    let listed = match names.split_last() {
        Some((last, rest)) => format!("{}, or {}", rest.join(", "), last),
        None => String::new(),
    };
    format!(
        "given the audio file, choose which preset you believe fits best. \
         please only say: {listed}. "
    )
}

pub fn tuning_instruction() -> String {
    let names: Vec<&str> = TUNING_FIELDS.iter().map(|(name, _)| *name).collect();
    let kinds: Vec<&str> = TUNING_FIELDS.iter().map(|(_, kind)| kind.placeholder()).collect();
    format!(
        "with the given audio file, write '{} = {}' \
         where INT, HEXSTRING, and FLOAT are values based on the song's vibe. \
         HEXSTRING values are colors written as #rrggbb. \
         Reply with that single assignment and nothing else. \
         Use the CSV file for sensible defaults, but FEEL FREE TO EXPERIMENT.",
        names.join(", "),
        kinds.join(", ")
    )
}
