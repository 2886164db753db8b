use log::warn;
use relic_formats::{Script, ScriptOpcode};

use crate::session::SessionError;

/// Operations the byte-code may name. Everything else is carried as
/// `Unknown` and dispatches to a logged no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    DrawImage,
    PlayMovie,
    ChangeLocation,
    PlaySound,
    Unknown(u8),
}

impl Opcode {
    pub fn from_byte(op: u8) -> Self {
        match op {
            0x03 => Opcode::DrawImage,
            0x60 | 0x62 => Opcode::PlayMovie,
            0x67 => Opcode::ChangeLocation,
            0x8C => Opcode::PlaySound,
            other => Opcode::Unknown(other),
        }
    }

    /// Arguments the handler reads.
    fn required_args(self) -> usize {
        match self {
            Opcode::DrawImage | Opcode::PlayMovie => 1,
            Opcode::PlaySound => 2,
            Opcode::ChangeLocation => 3,
            Opcode::Unknown(_) => 0,
        }
    }
}

/// Requests the interpreter makes of the running game.
pub trait ScriptHost {
    fn draw_image(&mut self, id: i16) -> Result<(), SessionError>;
    fn play_movie(&mut self, id: i16) -> Result<(), SessionError>;
    /// Must return immediately; the location is entered later.
    fn change_location(&mut self, age: i16, room: i16, node: i16) -> Result<(), SessionError>;
    fn play_sound(&mut self, id: i16, volume: i32) -> Result<(), SessionError>;
}

/// Percent volume from a script argument scaled to 0..=255.
pub fn scale_volume(percent: i16) -> i32 {
    i32::from(percent) * 255 / 100
}

/// Run every opcode of `script` in order. There are no jumps.
pub fn execute<H: ScriptHost + ?Sized>(script: &Script, host: &mut H) -> Result<(), SessionError> {
    for op in script {
        dispatch(op, host)?;
    }
    Ok(())
}

pub fn dispatch<H: ScriptHost + ?Sized>(op: &ScriptOpcode, host: &mut H) -> Result<(), SessionError> {
    let opcode = Opcode::from_byte(op.op);
    if op.args.len() < opcode.required_args() {
        warn!(
            "opcode {:#04x} needs {} arguments, got {:?}; skipped",
            op.op,
            opcode.required_args(),
            op.args
        );
        return Ok(());
    }

    match opcode {
        Opcode::DrawImage => host.draw_image(op.args[0]),
        Opcode::PlayMovie => host.play_movie(op.args[0]),
        Opcode::ChangeLocation => host.change_location(op.args[0], op.args[1], op.args[2]),
        Opcode::PlaySound => host.play_sound(op.args[0], scale_volume(op.args[1])),
        Opcode::Unknown(code) => {
            warn!("unknown opcode {code:#04x} with args {:?}", op.args);
            Ok(())
        }
    }
}
