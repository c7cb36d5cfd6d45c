use std::collections::BTreeMap;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use pulseseq_core::emulator::CoreState;
use serde::{Deserialize, Serialize};

/// Expected end state of a scenario, one entry per core. Only the fields
/// present are checked.
#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct ExpectedState {
    pub cores: Vec<ExpectedCore>,
}

#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct ExpectedCore {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub registers: BTreeMap<u8, HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qclk: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pc: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl ExpectedCore {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Serialize, Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct HexValue {
    #[serde(with = "hex::serde")]
    value: [u8; 4],
}

impl From<u32> for HexValue {
    fn from(value: u32) -> Self {
        Self {
            value: value.to_be_bytes(),
        }
    }
}

impl From<HexValue> for u32 {
    fn from(hex: HexValue) -> Self {
        u32::from_be_bytes(hex.value)
    }
}

pub const EXAMPLE_JSON: &str = r##"
{
    "cores": [
        {
            "registers": {
                "1": "00000076",
                "9": "ffffffff"
            },
            "qclk": "00000040",
            "done": true
        }
    ]
}
"##;

/// Actual values of every expectation that did not hold, or `None` when
/// all of them did.
pub fn compare(expected: &ExpectedState, actual: &[CoreState]) -> Option<ExpectedState> {
    let mut diff = ExpectedState::default();
    for (index, expected_core) in expected.cores.iter().enumerate() {
        let mut core_diff = ExpectedCore::default();
        let Some(actual_core) = actual.get(index) else {
            // every expectation on a missing core fails; report it unchanged
            diff.cores.push(ExpectedCore {
                registers: expected_core.registers.clone(),
                ..*expected_core
            });
            continue;
        };

        for (reg, data) in &expected_core.registers {
            let actual_data = actual_core.registers.get(*reg as usize).copied().unwrap_or(0);
            if actual_data != u32::from(*data) {
                core_diff.registers.insert(*reg, actual_data.into());
            }
        }
        if let Some(qclk) = expected_core.qclk {
            if u32::from(qclk) != actual_core.qclk {
                core_diff.qclk = Some(actual_core.qclk.into());
            }
        }
        if let Some(pc) = expected_core.pc {
            if pc != actual_core.pc {
                core_diff.pc = Some(actual_core.pc);
            }
        }
        if let Some(done) = expected_core.done {
            if done != actual_core.done {
                core_diff.done = Some(actual_core.done);
            }
        }
        diff.cores.push(core_diff);
    }

    if diff.cores.iter().all(ExpectedCore::is_empty) {
        None
    } else {
        Some(diff)
    }
}

pub fn read_expected(path: &Path) -> Result<ExpectedState> {
    let file = std::fs::File::open(path)
        .wrap_err_with(|| format!("Failed to open expected state {}", path.display()))?;
    serde_json::from_reader(file).wrap_err("Failed to read JSON, improperly formatted.")
}

/// Writes `diff` next to the expectation as `<name>_diff.json`, or removes a
/// stale diff when the run passed.
pub fn write_diff(expected_path: &Path, diff: Option<&ExpectedState>) -> Result<()> {
    let stem = expected_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("expected");
    let diff_path = expected_path.with_file_name(format!("{stem}_diff.json"));
    match diff {
        Some(diff) => {
            let json_string = serde_json::to_string_pretty(diff)
                .wrap_err("Couldn't convert state difference to string!")?;
            std::fs::write(&diff_path, json_string)
                .wrap_err_with(|| format!("Failed to write {}", diff_path.display()))?;
        }
        None => {
            let _ = std::fs::remove_file(&diff_path);
        }
    }
    Ok(())
}
