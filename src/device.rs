//! Description of a touchpad device as discovered by the embedding layer.
//!
//! Device enumeration, capability discovery and calibration are not handled
//! here; the embedder queries the kernel device (e.g. through libevdev) and
//! fills in a [`DeviceDescription`]. [`Touchpad::new`] validates it and
//! derives the internal geometry from it.
//!
//! [`Touchpad::new`]: crate::touchpad::Touchpad::new

use crate::utils::DeviceCoords;

/// Range and resolution of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsInfo {
    /// Smallest reportable value.
    pub minimum: i32,
    /// Largest reportable value.
    pub maximum: i32,
    /// Device units per millimeter, or 0 if the device does not say.
    pub resolution: i32,
}

impl AbsInfo {
    /// Axis length in device units.
    pub fn range(&self) -> i32 {
        self.maximum - self.minimum
    }
}

bitflags::bitflags! {
    /// Hardware quirks keyed off specific touchpad models.
    ///
    /// These are set by the embedding layer from its quirk database (udev
    /// properties, vendor/product matching) and change behavior in small,
    /// model-specific ways.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModelFlags: u32 {
        /// Serial Synaptics touchpads that drop and re-add a touch on
        /// tool-count transitions.
        const SYNAPTICS_SERIAL = 1 << 0;
        /// Elantech semi-mt touchpads with accurate two-finger coordinates.
        const ELANTECH = 1 << 1;
        /// Semi-mt touchpads whose bounding box jumps with two fingers down;
        /// demoted to single-touch and gestures disabled.
        const JUMPING_SEMI_MT = 1 << 2;
        /// Lenovo X230 (and X220 fw 8.1) touchpads needing the custom
        /// low-resolution acceleration profile.
        const LENOVO_X230 = 1 << 3;
        /// Apple touchpads.
        const APPLE_TOUCHPAD = 1 << 4;
        /// Wacom external touchpads; palm detection stays off.
        const WACOM_TOUCHPAD = 1 << 5;
    }
}

/// Touchpad model families recognized from vendor/product ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchpadModel {
    /// Not a recognized model.
    #[default]
    Unknown,
    /// Serial Synaptics.
    Synaptics,
    /// ALPS.
    Alps,
    /// Elantech.
    Elantech,
    /// Apple legacy appletouch.
    Appletouch,
    /// Apple unibody MacBook.
    UnibodyMacbook,
}

impl TouchpadModel {
    /// Looks up the model family for a vendor/product id pair.
    pub fn lookup(vendor: u16, product: u16) -> TouchpadModel {
        struct ModelLookup {
            vendor: u16,
            product_start: u16,
            product_end: u16,
            model: TouchpadModel,
        }

        const TABLE: &[ModelLookup] = &[
            ModelLookup {
                vendor: 0x0002,
                product_start: 0x0007,
                product_end: 0x0007,
                model: TouchpadModel::Synaptics,
            },
            ModelLookup {
                vendor: 0x0002,
                product_start: 0x0008,
                product_end: 0x0008,
                model: TouchpadModel::Alps,
            },
            ModelLookup {
                vendor: 0x0002,
                product_start: 0x000e,
                product_end: 0x000e,
                model: TouchpadModel::Elantech,
            },
            ModelLookup {
                vendor: 0x05ac,
                product_start: 0,
                product_end: 0x0222,
                model: TouchpadModel::Appletouch,
            },
            ModelLookup {
                vendor: 0x05ac,
                product_start: 0x0223,
                product_end: 0x0228,
                model: TouchpadModel::UnibodyMacbook,
            },
            ModelLookup {
                vendor: 0x05ac,
                product_start: 0x0229,
                product_end: 0x022b,
                model: TouchpadModel::Appletouch,
            },
            ModelLookup {
                vendor: 0x05ac,
                product_start: 0x022c,
                product_end: 0xffff,
                model: TouchpadModel::UnibodyMacbook,
            },
        ];

        TABLE
            .iter()
            .find(|lookup| {
                lookup.vendor == vendor
                    && lookup.product_start <= product
                    && product <= lookup.product_end
            })
            .map(|lookup| lookup.model)
            .unwrap_or(TouchpadModel::Unknown)
    }
}

/// Everything the core needs to know about a touchpad up front.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    /// Human-readable device name, used in diagnostics.
    pub name: String,
    /// Vendor id.
    pub vendor: u16,
    /// Product id.
    pub product: u16,
    /// The x axis, if the device has one. Required.
    pub abs_x: Option<AbsInfo>,
    /// The y axis, if the device has one. Required.
    pub abs_y: Option<AbsInfo>,
    /// Number of real multi-touch slots, or `None` for single-touch devices.
    pub mt_slots: Option<usize>,
    /// Whether the device only reports the bounding box of the fingers.
    pub semi_mt: bool,
    /// The pressure axis, if reported per-slot.
    pub pressure: Option<AbsInfo>,
    /// Whether the device reports hover distance per-slot.
    pub reports_distance: bool,
    /// Whether the device reports `BTN_TOUCH`. Required.
    pub has_button_touch: bool,
    /// Highest finger count the `BTN_TOOL_*` bits can express (1..=5),
    /// or 0 if the device lacks `BTN_TOOL_FINGER`. Required to be >= 1.
    pub max_tool_fingers: usize,
    /// Whether the whole surface is one physical button.
    pub is_clickpad: bool,
    /// Whether the device has trackpoint-style buttons above the pad.
    pub has_top_buttons: bool,
    /// Advertised tracking resolution in DPI; 1000 if unknown.
    pub dpi: u32,
    /// Whether the axis resolution was made up rather than reported.
    pub fake_resolution: bool,
    /// Model-specific quirks.
    pub model_flags: ModelFlags,
    /// Last known positions per slot, for seeding the slot table.
    pub initial_positions: Vec<DeviceCoords>,
}

impl DeviceDescription {
    /// A plain multi-touch clickpad with the given axes and slot count.
    ///
    /// Convenience for tests and simple embedders; real integrations should
    /// fill every field from the kernel device.
    pub fn new(name: impl Into<String>, abs_x: AbsInfo, abs_y: AbsInfo, slots: usize) -> Self {
        DeviceDescription {
            name: name.into(),
            vendor: 0,
            product: 0,
            abs_x: Some(abs_x),
            abs_y: Some(abs_y),
            mt_slots: Some(slots),
            semi_mt: false,
            pressure: None,
            reports_distance: false,
            has_button_touch: true,
            max_tool_fingers: slots.min(5).max(1),
            is_clickpad: true,
            has_top_buttons: false,
            dpi: 1000,
            fake_resolution: false,
            model_flags: ModelFlags::empty(),
            initial_positions: Vec::new(),
        }
    }

    /// The model family this device belongs to.
    pub fn model(&self) -> TouchpadModel {
        TouchpadModel::lookup(self.vendor, self.product)
    }
}

/// Reasons a device is rejected at initialization.
///
/// A device missing any of these is not a functioning touchpad; the kernel
/// driver is handing us garbage and there is nothing sensible to emit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device reports no absolute x/y axes.
    #[error("device {0} has no absolute x/y axes")]
    MissingAbsAxis(String),
    /// The device cannot report touch state.
    #[error("device {0} has no BTN_TOUCH")]
    MissingButtonTouch(String),
    /// The device cannot report tool (finger) counts.
    #[error("device {0} has no BTN_TOOL_FINGER")]
    MissingToolFinger(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_lookup() {
        assert_eq!(TouchpadModel::lookup(0x0002, 0x0007), TouchpadModel::Synaptics);
        assert_eq!(TouchpadModel::lookup(0x0002, 0x000e), TouchpadModel::Elantech);
        assert_eq!(
            TouchpadModel::lookup(0x05ac, 0x0223),
            TouchpadModel::UnibodyMacbook
        );
        assert_eq!(TouchpadModel::lookup(0x05ac, 0x0100), TouchpadModel::Appletouch);
        assert_eq!(TouchpadModel::lookup(0x1234, 0x0001), TouchpadModel::Unknown);
    }

    #[test]
    fn abs_range() {
        let abs = AbsInfo {
            minimum: 100,
            maximum: 4100,
            resolution: 40,
        };
        assert_eq!(abs.range(), 4000);
    }
}
