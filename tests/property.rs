//! Property tests for the wire encoding and the derived display state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use proptest::prelude::*;

use imonlcd::proto::{self, CommandSet, DiscStyle, Icons, Protocol};
use imonlcd::state::{normalize_osd, IconForce, IconState, VolumeState};

fn arb_icons() -> impl Strategy<Value = Icons> {
    any::<u32>().prop_map(Icons::from_bits_truncate)
}

/// One concrete icon, the granularity of the force interface.
fn arb_single_icon() -> impl Strategy<Value = Icons> {
    (0u32..31).prop_map(|bit| Icons::from_bits_truncate(1 << bit))
}

/// The exclusive badge field an icon belongs to, or the icon itself.
fn field_of(icon: Icons) -> Icons {
    for mask in [
        Icons::TOP_MASK,
        Icons::SPEAKER_MASK,
        Icons::BR_MASK,
        Icons::BM_MASK,
        Icons::BL_MASK,
    ] {
        if icon.intersects(mask) {
            return icon | mask;
        }
    }
    icon
}

proptest! {
    /// The wire is plain little-endian; every word survives serialization.
    #[test]
    fn packets_are_little_endian_words(cmd in any::<u64>()) {
        prop_assert_eq!(u64::from_le_bytes(proto::packet(cmd)), cmd);
    }

    /// Pixel packets carry seven frame bytes at the register's offset,
    /// pad past the end of the frame with `0xFF` and end with the register.
    #[test]
    fn pixel_packets_carry_register_frame_and_padding(
        frame in prop::collection::vec(any::<u8>(), 0..256),
        reg in proto::PIXEL_REG_FIRST..=proto::PIXEL_REG_LAST,
    ) {
        let pkt = proto::pixel_packet(&frame, reg);
        prop_assert_eq!(pkt[proto::PIXEL_CHUNK], reg);

        let offset = usize::from(reg - proto::PIXEL_REG_FIRST) * proto::PIXEL_CHUNK;
        for i in 0..proto::PIXEL_CHUNK {
            let expect = frame.get(offset + i).copied().unwrap_or(0xFF);
            prop_assert_eq!(pkt[i], expect);
        }
    }

    /// A clock word spreads the time fields over one byte each, with the
    /// valid flag low and the protocol opcode untouched on top.
    #[test]
    fn clock_words_place_each_field_in_its_byte(
        year in 1970i32..2100,
        month in 1u32..=12,
        day in 1u32..=28,
        hour in 0u32..24,
        minute in 0u32..60,
        second in 0u32..60,
        alarm in any::<bool>(),
        v0038 in any::<bool>(),
    ) {
        let cmd = CommandSet::new(if v0038 { Protocol::V0038 } else { Protocol::Ffdc });
        let base = if alarm { cmd.alarm } else { cmd.display };
        let t = NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap();

        let b = proto::packet(proto::clock_word(base, t));
        prop_assert_eq!(b[0], 0x80);
        prop_assert_eq!(b[1], ((year - 1900) & 0xFF) as u8);
        prop_assert_eq!(b[2], (month - 1) as u8);
        prop_assert_eq!(b[3], day as u8);
        prop_assert_eq!(b[4], hour as u8);
        prop_assert_eq!(b[5], minute as u8);
        prop_assert_eq!(b[6], second as u8);
        prop_assert_eq!(b[7], proto::packet(base)[7]);
    }
}

proptest! {
    /// A bar pixmap lights exactly as many pixels as the requested length.
    #[test]
    fn bar_pixmaps_light_exactly_the_requested_pixels(len in -32i32..=32) {
        prop_assert_eq!(proto::length_to_pixmap(len).count_ones(), len.unsigned_abs());
    }

    /// Lengths past either edge of the bar light nothing.
    #[test]
    fn bar_lengths_past_the_edge_are_empty(len in 33i32..10_000) {
        prop_assert_eq!(proto::length_to_pixmap(len), 0);
        prop_assert_eq!(proto::length_to_pixmap(-len), 0);
    }

    /// A right-to-left bar is the complement of the left-to-right bar of
    /// the remaining length.
    #[test]
    fn mirrored_bars_complement_each_other(len in 0i32..=32) {
        prop_assert_eq!(
            proto::length_to_pixmap(-len),
            !proto::length_to_pixmap(32 - len)
        );
    }

    /// The three line words always land on their registers, whatever the
    /// pixmaps hold.
    #[test]
    fn bar_words_keep_their_registers(
        top_line in any::<u32>(),
        bot_line in any::<u32>(),
        top_bar in any::<u32>(),
        bot_bar in any::<u32>(),
    ) {
        let [w0, w1, w2] = proto::progress_words(top_line, bot_line, top_bar, bot_bar);
        prop_assert_eq!(w0 >> 56, 0x10);
        prop_assert_eq!(w1 >> 56, 0x11);
        prop_assert_eq!(w2 >> 56, 0x12);
    }

    /// The split over three words loses no pixmap bits.
    #[test]
    fn bar_words_pack_all_four_pixmaps_losslessly(
        top_line in any::<u32>(),
        bot_line in any::<u32>(),
        top_bar in any::<u32>(),
        bot_bar in any::<u32>(),
    ) {
        let [w0, w1, w2] = proto::progress_words(top_line, bot_line, top_bar, bot_bar);

        prop_assert_eq!((w0 & 0xFFFF_FFFF) as u32, top_line);
        prop_assert_eq!(
            (((w0 >> 32) & 0x00FF_FFFF) | ((w1 & 0xFF) << 24)) as u32,
            top_bar
        );
        prop_assert_eq!(((w1 >> 8) & 0xFFFF_FFFF) as u32, bot_bar);
        prop_assert_eq!(
            (((w1 >> 40) & 0xFFFF) | ((w2 & 0xFFFF) << 16)) as u32,
            bot_line
        );
    }
}

proptest! {
    /// Icon payloads stay out of the opcode byte for any state.
    #[test]
    fn icon_payloads_never_touch_the_opcode_byte(
        state in arb_icons(),
        phase in any::<u8>(),
        full in any::<bool>(),
    ) {
        let style = if full { DiscStyle::Full } else { DiscStyle::Slim };
        let (word, _) = proto::icon_word(state, phase, style);
        prop_assert_eq!(word >> 56, 0);
    }

    /// Without disc segments the word depends on neither phase nor style,
    /// and the phase passes through unchanged.
    #[test]
    fn static_icon_words_ignore_phase_and_style(
        state in arb_icons(),
        p1 in any::<u8>(),
        p2 in any::<u8>(),
    ) {
        let state = state - Icons::DISC_SPIN;
        let (w1, n1) = proto::icon_word(state, p1, DiscStyle::Slim);
        let (w2, n2) = proto::icon_word(state, p2, DiscStyle::Full);
        prop_assert_eq!(w1, w2);
        prop_assert_eq!(n1, p1);
        prop_assert_eq!(n2, p2);
    }

    /// A running spin advances exactly one segment pair per word, in the
    /// requested direction.
    #[test]
    fn running_spin_steps_one_segment_per_word(
        phase in 0u8..4,
        backward in any::<bool>(),
    ) {
        let mut state = Icons::DISC_SPIN | Icons::DISC_RUN_SPIN;
        if backward {
            state |= Icons::DISC_SPIN_BACKWARD;
        }
        let (_, next) = proto::icon_word(state, phase, DiscStyle::Slim);
        let expect = if backward { (phase + 3) % 4 } else { (phase + 1) % 4 };
        prop_assert_eq!(next, expect);
    }

    /// The two disc renditions light complementary segment sets.
    #[test]
    fn disc_segment_styles_complement(
        phase in any::<u8>(),
        run in any::<bool>(),
        backward in any::<bool>(),
    ) {
        let mut state = Icons::DISC_SPIN;
        if run {
            state |= Icons::DISC_RUN_SPIN;
        }
        if backward {
            state |= Icons::DISC_SPIN_BACKWARD;
        }
        let (slim, _) = proto::icon_word(state, phase, DiscStyle::Slim);
        let (full, _) = proto::icon_word(state, phase, DiscStyle::Full);
        prop_assert_eq!(slim ^ full, 0xFFu64 << 40);
    }
}

proptest! {
    /// A forced-on icon is always visible, a forced-off icon never is, and
    /// icons outside the claimed field are left to automatic control.
    #[test]
    fn forced_icons_dominate_only_their_field(
        auto in arb_icons(),
        icon in arb_single_icon(),
        off in any::<bool>(),
    ) {
        let mut force = IconForce::default();
        let state = if off { IconState::Off } else { IconState::On };
        prop_assert_eq!(force.set(icon, state), state);

        let shown = force.apply(auto);
        if off {
            prop_assert!(!shown.intersects(icon));
        } else {
            prop_assert!(shown.contains(icon));
        }
        let outside = !field_of(icon);
        prop_assert_eq!(shown & outside, auto & outside);
    }

    /// Releasing the claimed field returns the display to automatic state.
    #[test]
    fn releasing_a_forced_field_restores_automatic_control(
        auto in arb_icons(),
        icon in arb_single_icon(),
    ) {
        let mut force = IconForce::default();
        force.set(icon, IconState::On);
        prop_assert_eq!(force.set(field_of(icon), IconState::Auto), IconState::Auto);
        prop_assert_eq!(force.apply(auto), auto);
    }

    /// Queries report the override without disturbing it.
    #[test]
    fn queries_never_change_the_override(
        auto in arb_icons(),
        icon in arb_single_icon(),
    ) {
        let mut force = IconForce::default();
        force.set(icon, IconState::On);
        let before = force.apply(auto);
        prop_assert_eq!(force.set(icon, IconState::Query), IconState::On);
        prop_assert_eq!(force.apply(auto), before);
    }

    /// Absolute volume updates flag exactly the mute edges.
    #[test]
    fn absolute_volume_updates_flag_the_mute_edges(
        values in prop::collection::vec(0i32..=255, 1..40),
    ) {
        let mut volume = VolumeState::new(100);
        let mut percent = 100;
        let mut muted = false;
        for &value in &values {
            let next = 100 * value / 255;
            let edge = (percent > 0 && next == 0) || (percent == 0 && next > 0);
            prop_assert_eq!(volume.update(value, true), edge);
            if edge {
                muted = next == 0;
            }
            percent = next;
            prop_assert_eq!(volume.is_muted(), muted);
            prop_assert_eq!(volume.percent(), percent);
        }
    }

    /// Normalized text is single-spaced with no blank edges; blank input
    /// clears the slot.
    #[test]
    fn normalized_text_is_single_spaced(s in ".*") {
        match normalize_osd(Some(&s)) {
            None => prop_assert!(s.trim().is_empty()),
            Some(t) => {
                prop_assert!(!t.is_empty());
                prop_assert!(!t.starts_with(' '));
                prop_assert!(!t.ends_with(' '));
                prop_assert!(!t.contains("  "));
                prop_assert!(t.chars().all(|c| c == ' ' || !c.is_whitespace()));
                // Stable under a second pass.
                prop_assert_eq!(normalize_osd(Some(&t)), Some(t));
            }
        }
    }
}
