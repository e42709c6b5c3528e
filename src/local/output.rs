// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multiplexing of node output onto a shared sink. Every line a node prints is tagged with the
//! node's name in a color picked for that node, and written to the sink in one locked write so
//! lines of concurrently running nodes never interleave.

use parking_lot::Mutex;
use std::{
    io::{self, Write},
    sync::Arc,
};
use termcolor::{Ansi, Color, ColorSpec, WriteColor};

const PALETTE: &[Color] = &[
    Color::Green,
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::Blue,
    Color::Red,
];

/// A writer shared by all the nodes of a network
pub type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn shared_sink<W: Write + Send + 'static>(writer: W) -> SharedSink {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Hands out colors from a fixed palette, cycling once it runs out.
#[derive(Debug, Default)]
pub struct ColorPicker {
    next: usize,
}

impl ColorPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_color(&mut self) -> Color {
        let color = PALETTE[self.next % PALETTE.len()];
        self.next += 1;
        color
    }
}

/// The escape sequence switching the terminal foreground to `color`
pub fn color_escape(color: Color) -> io::Result<Vec<u8>> {
    let mut ansi = Ansi::new(Vec::new());
    ansi.set_color(ColorSpec::new().set_fg(Some(color)))?;
    Ok(ansi.into_inner())
}

pub fn reset_escape() -> io::Result<Vec<u8>> {
    let mut ansi = Ansi::new(Vec::new());
    ansi.reset()?;
    Ok(ansi.into_inner())
}

/// Forwards lines to a [`SharedSink`], each prefixed with `[name] ` in the node's color.
#[derive(Clone)]
pub struct PrefixedWriter {
    prefix: Arc<[u8]>,
    sink: SharedSink,
}

impl PrefixedWriter {
    pub fn new(name: &str, color: Color, sink: SharedSink) -> io::Result<Self> {
        let mut prefix = color_escape(color)?;
        prefix.push(b'[');
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(b']');
        prefix.extend(reset_escape()?);
        prefix.push(b' ');
        Ok(Self {
            prefix: prefix.into(),
            sink,
        })
    }

    /// Writes a single line. A trailing newline is added when `line` lacks one.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut sink = self.sink.lock();
        sink.write_all(&self.prefix)?;
        sink.write_all(line)?;
        if !line.ends_with(b"\n") {
            sink.write_all(b"\n")?;
        }
        sink.flush()
    }
}
