//! Visualizer presets the model chooses between.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    BarSpectrum,
    HeartSpectrum,
    HeartWaveform,
    RadialSpectrum,
    RadialWaveform,
    RainSpectrum,
    Waveform,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::BarSpectrum,
        Preset::HeartSpectrum,
        Preset::HeartWaveform,
        Preset::RadialSpectrum,
        Preset::RadialWaveform,
        Preset::RainSpectrum,
        Preset::Waveform,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::BarSpectrum => "bar-spectrum",
            Preset::HeartSpectrum => "heart-spectrum",
            Preset::HeartWaveform => "heart-waveform",
            Preset::RadialSpectrum => "radial-spectrum",
            Preset::RadialWaveform => "radial-waveform",
            Preset::RainSpectrum => "rain-spectrum",
            Preset::Waveform => "waveform",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPreset(pub String);

impl fmt::Display for UnknownPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown preset: {:?}", self.0)
    }
}

impl std::error::Error for UnknownPreset {}

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}

/// What the model answered, and whether it was one of the known presets.
///
/// The label is the trimmed reply verbatim. Script paths are built from it
/// even when it is not a known preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetChoice {
    pub label: String,
    pub preset: Option<Preset>,
}

impl PresetChoice {
    pub fn from_reply(reply: &str) -> Self {
        let label = reply.trim().to_string();
        let preset = label.parse().ok();
        Self { label, preset }
    }

    pub fn is_recognized(&self) -> bool {
        self.preset.is_some()
    }

    pub fn script_path(&self) -> String {
        script_path(&self.label)
    }
}

/// Path of the front-end script for a preset label.
pub fn script_path(label: &str) -> String {
    format!("presets/{label}-script.js")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_parses_back() {
        for preset in Preset::ALL {
            assert_eq!(preset.as_str().parse::<Preset>(), Ok(preset));
        }
    }

    #[test]
    fn test_serde_matches_labels() {
        let json = serde_json::to_string(&Preset::RadialWaveform).unwrap();
        assert_eq!(json, "\"radial-waveform\"");
    }

    #[test]
    fn test_known_label_script_path() {
        let choice = PresetChoice::from_reply("rain-spectrum\n");
        assert_eq!(choice.preset, Some(Preset::RainSpectrum));
        assert_eq!(choice.script_path(), "presets/rain-spectrum-script.js");
    }

    #[test]
    fn test_extraneous_text_passes_through() {
        let choice = PresetChoice::from_reply("  waveform.  ");
        assert!(!choice.is_recognized());
        assert_eq!(choice.label, "waveform.");
        assert_eq!(choice.script_path(), "presets/waveform.-script.js");
    }

    #[test]
    fn test_unknown_preset_error() {
        let err = "Waveform".parse::<Preset>().unwrap_err();
        assert_eq!(err, UnknownPreset("Waveform".to_string()));
    }
}
