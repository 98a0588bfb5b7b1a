//! Soundtrack text parsing.
//!
//! The wire/file grammar for soundtrack authoring is intentionally
//! pluggable: a host embedding this engine with its own authoring tool
//! can implement [`SoundtrackParser`] directly against whatever format
//! it already has (JSON, a DAW's native project file, a custom DSL) and
//! never touch [`DefaultTextParser`] at all. The line-oriented grammar
//! below exists so the engine and its tests have something to parse out
//! of the box.

use crate::soundtrack::{FlowDef, Node, SequenceDef, SequenceStep, SoundDef, Soundtrack, WeightedChoice};
use crate::types::SmsError;

/// Implemented by any soundtrack grammar. `parse_into` builds into a
/// fresh scratch `Soundtrack` and only merges into the caller's
/// soundtrack on success, so a malformed document never leaves a
/// partially-applied soundtrack behind.
pub trait SoundtrackParser {
    fn parse(&self, source: &str) -> Result<Soundtrack, SmsError>;
}

/// Parses the default minimal soundtrack grammar: one declaration per
/// line, whitespace-separated fields, `#` line comments.
///
/// ```text
/// sound kick kick.wav loop=false gain=1.0
/// sequence intro kick snare
/// node root sequence intro
/// flow main root bus=music
/// ```
pub struct DefaultTextParser;

impl SoundtrackParser for DefaultTextParser {
    fn parse(&self, source: &str) -> Result<Soundtrack, SmsError> {
        let mut track = Soundtrack::new();

        for (line_no, raw_line) in source.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let keyword = fields
                .next()
                .ok_or_else(|| SmsError::Parse(format!("line {}: empty", line_no + 1)))?;

            match keyword {
                "sound" => parse_sound(&mut track, &mut fields, line_no)?,
                "sequence" => parse_sequence(&mut track, &mut fields, line_no)?,
                "node" => parse_node(&mut track, &mut fields, line_no)?,
                "flow" => parse_flow(&mut track, &mut fields, line_no)?,
                other => {
                    return Err(SmsError::Parse(format!(
                        "line {}: unknown keyword '{other}'",
                        line_no + 1
                    )));
                }
            }
        }

        Ok(track)
    }
}

fn take_name<'a>(fields: &mut impl Iterator<Item = &'a str>, line_no: usize, what: &str) -> Result<String, SmsError> {
    fields
        .next()
        .map(|s| s.to_string())
        .ok_or_else(|| SmsError::Parse(format!("line {}: missing {what}", line_no + 1)))
}

fn parse_sound<'a>(track: &mut Soundtrack, fields: &mut impl Iterator<Item = &'a str>, line_no: usize) -> Result<(), SmsError> {
    let name = take_name(fields, line_no, "sound name")?;
    let resource = take_name(fields, line_no, "sound resource")?;

    let mut looping = false;
    let mut gain = 1.0_f32;
    for field in fields {
        if let Some(value) = field.strip_prefix("gain=") {
            gain = value
                .parse()
                .map_err(|_| SmsError::Parse(format!("line {}: invalid gain '{value}'", line_no + 1)))?;
        } else if field == "loop" || field == "loop=true" {
            looping = true;
        }
    }

    track.sounds.insert(
        name,
        SoundDef {
            resource_name: resource,
            looping,
            base_gain: gain,
        },
    );
    Ok(())
}

/// Parses a step field, either a bare node name or
/// `name@gain=0.8,offset=0.5,fade_in=0.2,fade_out=0.3` (any subset of
/// the `@`-attributes, in any order).
fn parse_sequence_step(field: &str, line_no: usize) -> Result<SequenceStep, SmsError> {
    let Some((node_name, attrs)) = field.split_once('@') else {
        return Ok(SequenceStep::plain(field));
    };
    let mut step = SequenceStep::plain(node_name);
    for attr in attrs.split(',') {
        let (key, value) = attr
            .split_once('=')
            .ok_or_else(|| SmsError::Parse(format!("line {}: malformed step attribute '{attr}'", line_no + 1)))?;
        match key {
            "gain" => {
                step.gain = value
                    .parse()
                    .map_err(|_| SmsError::Parse(format!("line {}: invalid step gain '{value}'", line_no + 1)))?;
            }
            "offset" => {
                step.offset_frames = value
                    .parse()
                    .map_err(|_| SmsError::Parse(format!("line {}: invalid step offset '{value}'", line_no + 1)))?;
            }
            "fade_in" => {
                step.fade_in_frames = value
                    .parse()
                    .map_err(|_| SmsError::Parse(format!("line {}: invalid step fade_in '{value}'", line_no + 1)))?;
            }
            "fade_out" => {
                step.fade_out_frames = value
                    .parse()
                    .map_err(|_| SmsError::Parse(format!("line {}: invalid step fade_out '{value}'", line_no + 1)))?;
            }
            other => {
                return Err(SmsError::Parse(format!("line {}: unknown step attribute '{other}'", line_no + 1)));
            }
        }
    }
    Ok(step)
}

fn parse_sequence<'a>(track: &mut Soundtrack, fields: &mut impl Iterator<Item = &'a str>, line_no: usize) -> Result<(), SmsError> {
    let name = take_name(fields, line_no, "sequence name")?;
    let mut steps = Vec::new();
    let mut looping = false;
    for field in fields {
        if field == "loop" {
            looping = true;
        } else {
            steps.push(parse_sequence_step(field, line_no)?);
        }
    }
    track.sequences.insert(name, SequenceDef { steps, looping });
    Ok(())
}

fn parse_node<'a>(track: &mut Soundtrack, fields: &mut impl Iterator<Item = &'a str>, line_no: usize) -> Result<(), SmsError> {
    let name = take_name(fields, line_no, "node name")?;
    let kind = take_name(fields, line_no, "node kind")?;
    let rest: Vec<String> = fields.map(|s| s.to_string()).collect();

    let node = match kind.as_str() {
        "sound" => {
            let sound_name = rest
                .first()
                .ok_or_else(|| SmsError::Parse(format!("line {}: node sound missing target", line_no + 1)))?;
            Node::Sound(sound_name.clone())
        }
        "sequence" => {
            let sequence_name = rest
                .first()
                .ok_or_else(|| SmsError::Parse(format!("line {}: node sequence missing target", line_no + 1)))?;
            let def = track
                .sequences
                .get(sequence_name)
                .ok_or_else(|| SmsError::Parse(format!("line {}: unknown sequence '{sequence_name}'", line_no + 1)))?
                .clone();
            Node::Sequence(def)
        }
        "random" => Node::Random(rest),
        "weighted" => {
            let mut choices = Vec::new();
            for entry in rest {
                let (node_name, weight) = entry
                    .split_once(':')
                    .ok_or_else(|| SmsError::Parse(format!("line {}: weighted entry missing ':weight'", line_no + 1)))?;
                let weight: f32 = weight
                    .parse()
                    .map_err(|_| SmsError::Parse(format!("line {}: invalid weight '{weight}'", line_no + 1)))?;
                choices.push(WeightedChoice {
                    node_name: node_name.to_string(),
                    weight,
                });
            }
            Node::Weighted(choices)
        }
        "conditional" => {
            if rest.len() < 3 {
                return Err(SmsError::Parse(format!(
                    "line {}: conditional needs control, if-nonzero, if-zero",
                    line_no + 1
                )));
            }
            Node::Conditional {
                control_name: rest[0].as_bytes().to_vec(),
                if_nonzero: rest[1].clone(),
                if_zero: rest[2].clone(),
            }
        }
        "parallel" => Node::Parallel(rest),
        "loop" => {
            let child = rest
                .first()
                .ok_or_else(|| SmsError::Parse(format!("line {}: loop missing child", line_no + 1)))?
                .clone();
            let count = rest.get(1).and_then(|s| s.parse().ok());
            Node::Loop { child, count }
        }
        other => {
            return Err(SmsError::Parse(format!("line {}: unknown node kind '{other}'", line_no + 1)));
        }
    };

    track.nodes.insert(name, node);
    Ok(())
}

fn parse_flow<'a>(track: &mut Soundtrack, fields: &mut impl Iterator<Item = &'a str>, line_no: usize) -> Result<(), SmsError> {
    let name = take_name(fields, line_no, "flow name")?;
    let root_node = take_name(fields, line_no, "flow root node")?;
    let mut bus_name = crate::constants::BUS_NAME_MAIN.to_string();
    for field in fields {
        if let Some(value) = field.strip_prefix("bus=") {
            bus_name = value.to_string();
        }
    }
    track.flows.insert(name, FlowDef { root_node, bus_name });
    Ok(())
}

/// Parse `source` with `parser` into a new, standalone soundtrack.
pub fn parse_new(parser: &dyn SoundtrackParser, source: &str) -> Result<Soundtrack, SmsError> {
    parser.parse(source)
}

/// Parse `source` with `parser` and, only on success, replace the
/// contents of `target` by name. A parse failure leaves `target`
/// untouched.
pub fn parse_into(parser: &dyn SoundtrackParser, source: &str, target: &mut Soundtrack) -> Result<(), SmsError> {
    let parsed = parser.parse(source)?;
    target.merge_replace(parsed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_soundtrack() {
        let source = "\
sound kick kick.wav loop gain=0.8
node root sound kick
flow main root bus=music
";
        let track = DefaultTextParser.parse(source).unwrap();
        assert!(track.resolve_sound("kick").unwrap().looping);
        assert_eq!(track.resolve_sound("kick").unwrap().base_gain, 0.8);
        assert_eq!(track.resolve_flow("main").unwrap().bus_name, "music");
    }

    #[test]
    fn unknown_keyword_is_a_parse_error() {
        let err = DefaultTextParser.parse("bogus line here").unwrap_err();
        assert!(matches!(err, SmsError::Parse(_)));
    }

    #[test]
    fn failed_parse_into_leaves_target_untouched() {
        let mut track = Soundtrack::new();
        track.sounds.insert(
            "existing".into(),
            SoundDef { resource_name: "a.wav".into(), looping: false, base_gain: 1.0 },
        );
        let result = parse_into(&DefaultTextParser, "bogus", &mut track);
        assert!(result.is_err());
        assert!(track.resolve_sound("existing").is_some());
    }

    #[test]
    fn successful_parse_into_merges_by_name_rather_than_replacing_everything() {
        let mut track = Soundtrack::new();
        track.sounds.insert(
            "kick".into(),
            SoundDef { resource_name: "kick.wav".into(), looping: false, base_gain: 1.0 },
        );
        track.sounds.insert(
            "snare".into(),
            SoundDef { resource_name: "snare.wav".into(), looping: false, base_gain: 1.0 },
        );

        parse_into(&DefaultTextParser, "sound kick kick2.wav\n", &mut track).unwrap();

        assert_eq!(track.resolve_sound("kick").unwrap().resource_name, "kick2.wav");
        assert!(track.resolve_sound("snare").is_some(), "parse_into must not drop entries the incoming source doesn't mention");
    }

    #[test]
    fn sequence_steps_parse_per_item_attributes() {
        let source = "\
sequence intro kick@gain=0.5,offset=1200 snare@fade_in=300,fade_out=400 loop
";
        let track = DefaultTextParser.parse(source).unwrap();
        let seq = track.sequences.get("intro").unwrap();
        assert!(seq.looping);
        assert_eq!(seq.steps.len(), 2);
        assert_eq!(seq.steps[0].node_name, "kick");
        assert_eq!(seq.steps[0].gain, 0.5);
        assert_eq!(seq.steps[0].offset_frames, 1200);
        assert_eq!(seq.steps[1].node_name, "snare");
        assert_eq!(seq.steps[1].fade_in_frames, 300);
        assert_eq!(seq.steps[1].fade_out_frames, 400);
    }

    #[test]
    fn sequence_step_without_attributes_defaults_to_plain() {
        let source = "sequence intro kick snare\n";
        let track = DefaultTextParser.parse(source).unwrap();
        let seq = track.sequences.get("intro").unwrap();
        assert_eq!(seq.steps[0].gain, 1.0);
        assert_eq!(seq.steps[0].offset_frames, 0);
    }
}
