//! # Draw Dispatch
//!
//! Submits munged units to a device. Decal chains are drawn in up to three
//! phases:
//!
//! ```text
//! chain:  base … base │ separator │ decal … decal
//!         ───────────   ─────────   ─────────────
//! phase:  BaseFirst                 Nested
//!         BaseSecond (only if the device asks)
//! ```

use crate::device::{DecalPhase, DrawCall, GraphicsDevice};
use crate::unit::DrawUnit;

impl DrawUnit {
    /// Submits this unit alone. Units without geometry are skipped.
    ///
    /// Returns true if a draw was issued.
    pub fn draw<D: GraphicsDevice + ?Sized>(&self, device: &mut D) -> bool {
        self.draw_in_phase(device, None)
    }

    fn draw_in_phase<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        phase: Option<DecalPhase>,
    ) -> bool {
        let Some(geometry) = &self.geometry else {
            return false;
        };
        device.draw(&DrawCall {
            geometry,
            munged_data: self.munged_data.as_ref(),
            state: &self.render_state,
            modelview_transform: &self.modelview_transform,
            phase,
        });
        true
    }
}

/// Draws a whole chain, phased when it carries decals.
///
/// Units before the first separator are the base; units after it are the
/// decals. A chain without a separator, or with nothing after it, is drawn
/// as plain base units. Returns the number of draws issued.
pub fn draw_with_decals<D: GraphicsDevice + ?Sized>(head: &DrawUnit, device: &mut D) -> usize {
    let bases = || head.iter_chain().take_while(|unit| !unit.is_separator());
    let decals = || {
        head.iter_chain()
            .skip_while(|unit| !unit.is_separator())
            .filter(|unit| !unit.is_separator())
    };

    if decals().next().is_none() {
        return bases().filter(|unit| unit.draw(device)).count();
    }

    let mut issued = 0;
    if device.begin_decal_phase(DecalPhase::BaseFirst) {
        issued += bases()
            .filter(|unit| unit.draw_in_phase(device, Some(DecalPhase::BaseFirst)))
            .count();
    }
    if device.begin_decal_phase(DecalPhase::Nested) {
        issued += decals()
            .filter(|unit| unit.draw_in_phase(device, Some(DecalPhase::Nested)))
            .count();
    }
    if device.begin_decal_phase(DecalPhase::BaseSecond) {
        issued += bases()
            .filter(|unit| unit.draw_in_phase(device, Some(DecalPhase::BaseSecond)))
            .count();
    }
    tracing::trace!(issued, "drew decal chain");
    issued
}
