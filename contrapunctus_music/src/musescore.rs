// MuseScore (.mscx) score export.
//
// The counterpoint is written into an existing score template: the
// template's first `head_bytes` and last `tail_bytes` are kept verbatim and
// the generated chord elements are spliced between them. The offsets
// depend on the template; the defaults fit the bundled chorale template,
// where the cut falls inside the counterpoint staff's first measure.
//
// Each note becomes one `<Chord>` with its duration glyph (and a `<dots>`
// marker for dotted values) and its MIDI pitch. Durations without a glyph
// are an error rather than a silently substituted quarter note.

use crate::error::{Error, Result};
use crate::melody::{Melody, Tick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Notation glyph for one note value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationGlyph {
    /// MuseScore `durationType` name, e.g. "quarter".
    pub duration_type: String,
    #[serde(default)]
    pub dots: u8,
}

impl DurationGlyph {
    fn new(duration_type: &str, dots: u8) -> Self {
        DurationGlyph {
            duration_type: duration_type.to_string(),
            dots,
        }
    }
}

/// Tick durations to glyphs: eighth, quarter, dotted quarter, half, dotted
/// half, whole.
pub fn default_duration_map() -> BTreeMap<Tick, DurationGlyph> {
    BTreeMap::from([
        (1, DurationGlyph::new("eighth", 0)),
        (2, DurationGlyph::new("quarter", 0)),
        (3, DurationGlyph::new("quarter", 1)),
        (4, DurationGlyph::new("half", 0)),
        (6, DurationGlyph::new("half", 1)),
        (8, DurationGlyph::new("whole", 0)),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreSettings {
    pub template: PathBuf,
    pub head_bytes: usize,
    pub tail_bytes: usize,
    pub out_dir: PathBuf,
    pub filename_prefix: String,
    pub durations: BTreeMap<Tick, DurationGlyph>,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        ScoreSettings {
            template: PathBuf::from("templates/chorale.mscx"),
            head_bytes: 5116,
            tail_bytes: 3251,
            out_dir: PathBuf::from("counterpoints"),
            filename_prefix: "chorale_with_counterpoint_".to_string(),
            durations: default_duration_map(),
        }
    }
}

/// Something that can persist a finished counterpoint as a score.
pub trait ScoreExporter {
    /// Export `melody` and return the path written.
    fn export_melody(&self, melody: &Melody) -> Result<PathBuf>;
}

/// One `<Chord>` element per note, in melody order.
pub fn melody_to_body_xml(
    melody: &Melody,
    durations: &BTreeMap<Tick, DurationGlyph>,
) -> Result<String> {
    let mut body = String::new();
    for note in melody.notes() {
        let glyph = durations
            .get(&note.duration)
            .ok_or(Error::UnsupportedDuration {
                duration: note.duration,
            })?;
        body.push_str("<Chord>");
        if glyph.dots > 0 {
            let _ = write!(body, "<dots>{}</dots>", glyph.dots);
        }
        let _ = writeln!(
            body,
            "<durationType>{}</durationType><Note><pitch>{}</pitch></Note></Chord>",
            glyph.duration_type, note.pitch
        );
    }
    Ok(body)
}

/// Split a template into its kept head and tail.
pub fn split_template(template: &str, head_bytes: usize, tail_bytes: usize) -> Result<(&str, &str)> {
    let len = template.len();
    let split_error = || Error::TemplateSplit {
        len,
        head: head_bytes,
        tail: tail_bytes,
    };
    let tail_start = len.checked_sub(tail_bytes).ok_or_else(split_error)?;
    if head_bytes > tail_start
        || !template.is_char_boundary(head_bytes)
        || !template.is_char_boundary(tail_start)
    {
        return Err(split_error());
    }
    Ok((&template[..head_bytes], &template[tail_start..]))
}

/// Writes `<out_dir>/<prefix><stamp>.mscx` from a template file.
pub struct MscxExporter {
    settings: ScoreSettings,
    stamp: String,
}

impl MscxExporter {
    pub fn new(settings: ScoreSettings, stamp: impl Into<String>) -> Self {
        MscxExporter {
            settings,
            stamp: stamp.into(),
        }
    }

    pub fn out_path(&self) -> PathBuf {
        self.settings
            .out_dir
            .join(format!("{}{}.mscx", self.settings.filename_prefix, self.stamp))
    }

    fn read_template(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}

impl ScoreExporter for MscxExporter {
    fn export_melody(&self, melody: &Melody) -> Result<PathBuf> {
        let template = self.read_template(&self.settings.template)?;
        let (head, tail) =
            split_template(&template, self.settings.head_bytes, self.settings.tail_bytes)?;
        let body = melody_to_body_xml(melody, &self.settings.durations)?;

        fs::create_dir_all(&self.settings.out_dir)?;
        let path = self.out_path();
        fs::write(&path, [head, body.as_str(), tail].concat())?;
        info!(path = %path.display(), notes = melody.len(), "score exported");
        Ok(path)
    }
}
