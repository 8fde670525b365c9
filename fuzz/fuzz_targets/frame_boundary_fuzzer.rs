//! Fuzz target for length-prefix boundary conditions
//!
//! # Strategy
//!
//! - Declared length: zero, small, at-max, just-over-max, u32::MAX, random
//! - Actual body: shorter, equal or longer than declared
//!
//! # Invariants
//!
//! - Declared length over `MAX_FRAME_SIZE` MUST return `FrameTooLarge`
//! - Body shorter than declared MUST return `FrameTooShort`
//! - Trailing bytes MUST return `LengthMismatch`
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use huddle_proto::{ClientEvent, ProtocolError, codec};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    declared: DeclaredLength,
    body: Vec<u8>,
}

#[derive(Debug, Clone, Arbitrary)]
enum DeclaredLength {
    Zero,
    Small(u8),
    AtMax,
    JustOverMax,
    MaxU32,
    MatchBody,
    Random(u32),
}

fuzz_target!(|boundary: BoundaryFrame| {
    let max = codec::MAX_FRAME_SIZE as u32;
    let declared = match boundary.declared {
        DeclaredLength::Zero => 0,
        DeclaredLength::Small(s) => u32::from(s),
        DeclaredLength::AtMax => max,
        DeclaredLength::JustOverMax => max + 1,
        DeclaredLength::MaxU32 => u32::MAX,
        DeclaredLength::MatchBody => boundary.body.len() as u32,
        DeclaredLength::Random(r) => r,
    };

    let mut frame = declared.to_be_bytes().to_vec();
    frame.extend_from_slice(&boundary.body);

    match codec::decode::<ClientEvent>(&frame) {
        Ok(_) => {
            assert!(declared <= max);
            assert_eq!(declared as usize, boundary.body.len());
        },
        Err(ProtocolError::FrameTooLarge { .. }) => assert!(declared > max),
        Err(ProtocolError::FrameTooShort { .. }) => {
            assert!(declared <= max);
            assert!(boundary.body.len() < declared as usize);
        },
        Err(ProtocolError::LengthMismatch { .. }) => {
            assert!(boundary.body.len() > declared as usize);
        },
        Err(_) => assert!(declared <= max),
    }
});
