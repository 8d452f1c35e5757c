//! External collaborator interfaces.
//!
//! The core arbitrates the address space but does not render pixels,
//! synthesize audio, or poll input: those live behind the traits here and
//! are supplied by the host at construction. The null implementations model
//! a disconnected device ("line dead"): reads see open bus and writes are
//! dropped, so the core runs headless out of the box.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Video collaborator: VRAM (0x8000-0x9FFF), OAM (0xFE00-0xFE9F) and the
/// PPU hardware registers. Addresses are passed through untranslated.
pub trait VideoBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    fn read_oam(&mut self, addr: u16) -> u8;
    fn write_oam(&mut self, addr: u16, value: u8);
    fn read_hwio(&mut self, addr: u16) -> u8;
    fn write_hwio(&mut self, addr: u16, value: u8);
}

/// Sound collaborator: the APU register file (0xFF10-0xFF3F, 0xFF76-0xFF77).
pub trait SoundChip {
    fn read_hwio(&mut self, addr: u16) -> u8;
    fn write_hwio(&mut self, addr: u16, value: u8);
}

/// A small register-file peripheral (joypad at 0xFF00, serial at
/// 0xFF01-0xFF02).
pub trait HwioPort {
    fn read_hwio(&mut self, addr: u16) -> u8;
    fn write_hwio(&mut self, addr: u16, value: u8);
}

/// Persistent storage for battery-backed cartridge RAM, keyed by the decoded
/// cartridge title. Absence of a saved image is a normal outcome and is
/// reported as `None`, never as an empty buffer.
pub trait SramStore {
    fn load(&mut self, title: &str) -> Option<Vec<u8>>;
    fn save(&mut self, title: &str, data: &[u8]);
}

/// A disconnected video device.
#[derive(Debug, Default)]
pub struct NullVideo;

impl VideoBus for NullVideo {
    fn read(&mut self, _addr: u16) -> u8 {
        0xFF
    }
    fn write(&mut self, _addr: u16, _value: u8) {}
    fn read_oam(&mut self, _addr: u16) -> u8 {
        0xFF
    }
    fn write_oam(&mut self, _addr: u16, _value: u8) {}
    fn read_hwio(&mut self, _addr: u16) -> u8 {
        0xFF
    }
    fn write_hwio(&mut self, _addr: u16, _value: u8) {}
}

/// A disconnected sound chip.
#[derive(Debug, Default)]
pub struct NullSound;

impl SoundChip for NullSound {
    fn read_hwio(&mut self, _addr: u16) -> u8 {
        0xFF
    }
    fn write_hwio(&mut self, _addr: u16, _value: u8) {}
}

/// A disconnected peripheral port.
#[derive(Debug, Default)]
pub struct NullPort;

impl HwioPort for NullPort {
    fn read_hwio(&mut self, _addr: u16) -> u8 {
        0xFF
    }
    fn write_hwio(&mut self, _addr: u16, _value: u8) {}
}

/// Discards saves and never finds one.
#[derive(Debug, Default)]
pub struct NullSramStore;

impl SramStore for NullSramStore {
    fn load(&mut self, _title: &str) -> Option<Vec<u8>> {
        None
    }
    fn save(&mut self, _title: &str, _data: &[u8]) {}
}

/// In-memory SRAM store. Cloning yields a handle onto the same backing map,
/// so a caller can hand one clone to the core and keep another to inspect
/// what was flushed.
#[derive(Debug, Default, Clone)]
pub struct MemorySramStore {
    images: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySramStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, title: &str, data: Vec<u8>) {
        self.images.lock().unwrap().insert(title.to_string(), data);
    }

    pub fn get(&self, title: &str) -> Option<Vec<u8>> {
        self.images.lock().unwrap().get(title).cloned()
    }
}

impl SramStore for MemorySramStore {
    fn load(&mut self, title: &str) -> Option<Vec<u8>> {
        self.get(title)
    }

    fn save(&mut self, title: &str, data: &[u8]) {
        self.insert(title, data.to_vec());
    }
}

/// File-per-title SRAM store: `<dir>/<title>.sav`.
#[derive(Debug, Clone)]
pub struct DirSramStore {
    dir: PathBuf,
}

impl DirSramStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, title: &str) -> PathBuf {
        // Titles come from a ROM header and may contain anything; keep the
        // file name tame.
        let stem: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.sav"))
    }
}

impl SramStore for DirSramStore {
    fn load(&mut self, title: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(title)).ok()
    }

    fn save(&mut self, title: &str, data: &[u8]) {
        let path = self.path_for(title);
        if let Err(e) = fs::write(&path, data) {
            log::warn!("failed to save SRAM to {}: {e}", path.display());
        }
    }
}
