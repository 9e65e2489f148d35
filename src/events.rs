//! Beat events and the sinks that carry them downstream
//!
//! The line sink is the wire contract with downstream hardware: exactly
//! `"1\n"` for a confirmed onset and `"0\n"` for every other hop.

use std::io::Write;

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::audio::{TempoEstimator, Transition};
use crate::error::SinkError;

/// Outcome of one processed hop
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeatEvent {
    pub is_onset: bool,
    /// Stream time in seconds at the end of the hop
    pub timestamp: f64,
    /// Latest rolling BPM estimate, once two onsets have been seen
    pub estimated_bpm: Option<f32>,
    /// Spectral flux of the hop; `None` when the silence gate skipped analysis
    pub flux: Option<f32>,
    pub transition: Transition,
}

impl BeatEvent {
    /// Bytes written on the wire for this event
    pub fn wire_line(&self) -> &'static [u8] {
        if self.is_onset {
            b"1\n"
        } else {
            b"0\n"
        }
    }
}

/// Turns detector transitions into events and keeps the tempo estimate
#[derive(Debug, Default)]
pub struct EventEmitter {
    tempo: TempoEstimator,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            tempo: TempoEstimator::new(),
        }
    }

    pub fn emit(&mut self, transition: Transition, timestamp: f64, flux: Option<f32>) -> BeatEvent {
        if let Transition::Confirmed {
            interval: Some(interval),
        } = transition
        {
            self.tempo.record_interval(interval);
        }

        BeatEvent {
            is_onset: transition.is_onset(),
            timestamp,
            estimated_bpm: self.tempo.estimated_bpm(),
            flux,
            transition,
        }
    }

    pub fn estimated_bpm(&self) -> Option<f32> {
        self.tempo.estimated_bpm()
    }
}

/// Destination for beat events
pub trait EventSink {
    fn emit(&mut self, event: &BeatEvent) -> Result<(), SinkError>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &BeatEvent) -> Result<(), SinkError> {
        (**self).emit(event)
    }
}

/// ASCII `1`/`0` line per event, flushed immediately
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for LineSink<W> {
    fn emit(&mut self, event: &BeatEvent) -> Result<(), SinkError> {
        self.writer.write_all(event.wire_line())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per event, for inspecting detector behaviour
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &BeatEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards events over a bounded channel, blocking while it is full
pub struct ChannelSink {
    sender: Sender<BeatEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<BeatEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &BeatEvent) -> Result<(), SinkError> {
        self.sender.send(*event).map_err(|_| SinkError::Closed)
    }
}

/// Collects events in memory
impl EventSink for Vec<BeatEvent> {
    fn emit(&mut self, event: &BeatEvent) -> Result<(), SinkError> {
        self.push(*event);
        Ok(())
    }
}
