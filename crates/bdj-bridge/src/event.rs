use std::fmt;

use crate::bridge::with_environment;
use crate::error::BridgeError;
use crate::invoker::{self, ResolvedEntry};
use crate::runtime::{Arg, VirtualMachine};

/// Playback events relayed to the hosted program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventCode {
    None = 0,
    Chapter = 1,
    PlayItem = 2,
    Angle = 3,
    Subtitle = 4,
    Pip = 5,
    EndOfPlaylist = 6,
    Pts = 7,
    VkKey = 8,
}

impl EventCode {
    pub const ALL: [EventCode; 9] = [
        EventCode::None,
        EventCode::Chapter,
        EventCode::PlayItem,
        EventCode::Angle,
        EventCode::Subtitle,
        EventCode::Pip,
        EventCode::EndOfPlaylist,
        EventCode::Pts,
        EventCode::VkKey,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            EventCode::None => "NONE",
            EventCode::Chapter => "CHAPTER",
            EventCode::PlayItem => "PLAYITEM",
            EventCode::Angle => "ANGLE",
            EventCode::Subtitle => "SUBTITLE",
            EventCode::Pip => "PIP",
            EventCode::EndOfPlaylist => "END_OF_PLAYLIST",
            EventCode::Pts => "PTS",
            EventCode::VkKey => "VK_KEY",
        }
    }

    /// Accepts either the symbolic name or the numeric code.
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(code) = s.parse::<u32>() {
            return Self::try_from(code).ok();
        }
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s))
    }
}

impl TryFrom<u32> for EventCode {
    type Error = BridgeError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(BridgeError::InvalidEvent(code))
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dispatch one event. Faults and lookup failures are logged and dropped.
pub(crate) fn relay(
    vm: &dyn VirtualMachine,
    process_event: &ResolvedEntry,
    event: EventCode,
    param: u32,
) {
    tracing::debug!(event = %event, param, "Relaying event");

    // The hosted signature is (int, int); params beyond i32::MAX wrap as
    // they would across the native boundary.
    let args = [Arg::Int(event.code() as i32), Arg::Int(param as i32)];
    let result = with_environment(vm, |env| invoker::invoke(env, process_event, &args));

    if let Err(e) = result {
        tracing::debug!(event = %event, param, "Event not delivered: {e}");
    }
}
