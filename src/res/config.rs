use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

/// Size of the `ResTable_config` this crate writes. Larger records written
/// by newer tools are accepted and their extra fields ignored.
pub const CONFIG_SIZE: usize = 64;

pub const ORIENTATION_PORT: u8 = 1;
pub const ORIENTATION_LAND: u8 = 2;
pub const ORIENTATION_SQUARE: u8 = 3;

pub const DENSITY_LOW: u16 = 120;
pub const DENSITY_MEDIUM: u16 = 160;
pub const DENSITY_TV: u16 = 213;
pub const DENSITY_HIGH: u16 = 240;
pub const DENSITY_XHIGH: u16 = 320;
pub const DENSITY_XXHIGH: u16 = 480;
pub const DENSITY_XXXHIGH: u16 = 640;
pub const DENSITY_ANY: u16 = 0xfffe;
pub const DENSITY_NONE: u16 = 0xffff;

/// The qualifier set a type chunk was compiled for. Every field uses `0` as
/// "any".
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Configuration {
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_layout2: u8,
    pub color_mode: u8,
}

impl Configuration {
    /// Reads a `ResTable_config`. The record carries its own size; fields
    /// beyond it are wildcards and bytes beyond the known layout are skipped.
    pub fn read(r: &mut impl Read) -> Result<Self> {
        let size = r.read_u32::<LittleEndian>()? as usize;
        if size < 4 {
            return Err(Error::MalformedChunk(format!(
                "configuration of {} bytes is smaller than its size field",
                size
            )));
        }
        let mut buf = [0u8; CONFIG_SIZE];
        let known = (size - 4).min(CONFIG_SIZE - 4);
        r.read_exact(&mut buf[4..4 + known])?;
        let rest = (size - 4 - known) as u64;
        if rest > 0 && io::copy(&mut r.by_ref().take(rest), &mut io::sink())? < rest {
            return Err(Error::MalformedChunk(format!(
                "configuration of {} bytes overruns its chunk",
                size
            )));
        }

        let mut language = [0; 2];
        language.copy_from_slice(&buf[8..10]);
        let mut country = [0; 2];
        country.copy_from_slice(&buf[10..12]);
        let mut locale_script = [0; 4];
        locale_script.copy_from_slice(&buf[36..40]);
        let mut locale_variant = [0; 8];
        locale_variant.copy_from_slice(&buf[40..48]);
        Ok(Self {
            mcc: LittleEndian::read_u16(&buf[4..6]),
            mnc: LittleEndian::read_u16(&buf[6..8]),
            language,
            country,
            orientation: buf[12],
            touchscreen: buf[13],
            density: LittleEndian::read_u16(&buf[14..16]),
            keyboard: buf[16],
            navigation: buf[17],
            input_flags: buf[18],
            screen_width: LittleEndian::read_u16(&buf[20..22]),
            screen_height: LittleEndian::read_u16(&buf[22..24]),
            sdk_version: LittleEndian::read_u16(&buf[24..26]),
            minor_version: LittleEndian::read_u16(&buf[26..28]),
            screen_layout: buf[28],
            ui_mode: buf[29],
            smallest_screen_width_dp: LittleEndian::read_u16(&buf[30..32]),
            screen_width_dp: LittleEndian::read_u16(&buf[32..34]),
            screen_height_dp: LittleEndian::read_u16(&buf[34..36]),
            locale_script,
            locale_variant,
            screen_layout2: buf[48],
            color_mode: buf[49],
        })
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_u32::<LittleEndian>(CONFIG_SIZE as u32)?;
        w.write_u16::<LittleEndian>(self.mcc)?;
        w.write_u16::<LittleEndian>(self.mnc)?;
        w.write_all(&self.language)?;
        w.write_all(&self.country)?;
        w.write_u8(self.orientation)?;
        w.write_u8(self.touchscreen)?;
        w.write_u16::<LittleEndian>(self.density)?;
        w.write_u8(self.keyboard)?;
        w.write_u8(self.navigation)?;
        w.write_u8(self.input_flags)?;
        w.write_u8(0)?;
        w.write_u16::<LittleEndian>(self.screen_width)?;
        w.write_u16::<LittleEndian>(self.screen_height)?;
        w.write_u16::<LittleEndian>(self.sdk_version)?;
        w.write_u16::<LittleEndian>(self.minor_version)?;
        w.write_u8(self.screen_layout)?;
        w.write_u8(self.ui_mode)?;
        w.write_u16::<LittleEndian>(self.smallest_screen_width_dp)?;
        w.write_u16::<LittleEndian>(self.screen_width_dp)?;
        w.write_u16::<LittleEndian>(self.screen_height_dp)?;
        w.write_all(&self.locale_script)?;
        w.write_all(&self.locale_variant)?;
        w.write_u8(self.screen_layout2)?;
        w.write_u8(self.color_mode)?;
        w.write_all(&[0; CONFIG_SIZE - 50])?;
        Ok(())
    }

    /// Every selector widened to `u64`, in a fixed order.
    fn selectors(&self) -> [(Selector, u64); 23] {
        [
            (Selector::Exact, self.mcc as u64),
            (Selector::Exact, self.mnc as u64),
            (Selector::Exact, u16::from_le_bytes(self.language) as u64),
            (Selector::Exact, u16::from_le_bytes(self.country) as u64),
            (Selector::Exact, self.orientation as u64),
            (Selector::Exact, self.touchscreen as u64),
            (Selector::Density, self.density as u64),
            (Selector::Exact, self.keyboard as u64),
            (Selector::Exact, self.navigation as u64),
            (Selector::Exact, self.input_flags as u64),
            (Selector::AtMost, self.screen_width as u64),
            (Selector::AtMost, self.screen_height as u64),
            (Selector::AtMost, self.sdk_version as u64),
            (Selector::Exact, self.minor_version as u64),
            (Selector::Exact, self.screen_layout as u64),
            (Selector::Exact, self.ui_mode as u64),
            (Selector::AtMost, self.smallest_screen_width_dp as u64),
            (Selector::AtMost, self.screen_width_dp as u64),
            (Selector::AtMost, self.screen_height_dp as u64),
            (Selector::Exact, u32::from_le_bytes(self.locale_script) as u64),
            (Selector::Exact, u64::from_le_bytes(self.locale_variant)),
            (Selector::Exact, self.screen_layout2 as u64),
            (Selector::Exact, self.color_mode as u64),
        ]
    }

    /// True when no selector is pinned.
    pub fn is_default(&self) -> bool {
        self.specificity() == 0
    }

    /// Number of pinned selectors.
    pub fn specificity(&self) -> usize {
        self.selectors().iter().filter(|(_, v)| *v != 0).count()
    }

    /// Whether resources compiled for `self` may be used on a device
    /// described by `target`. Every pinned selector must agree with the
    /// target: the sdk version and screen sizes are lower bounds, an
    /// `anydpi` density agrees with any density, everything else must be
    /// equal.
    pub fn is_compatible_with(&self, target: &Configuration) -> bool {
        self.selectors()
            .iter()
            .zip(target.selectors().iter())
            .all(|((kind, ours), (_, theirs))| {
                if *ours == 0 {
                    return true;
                }
                match kind {
                    Selector::Exact => ours == theirs,
                    Selector::AtMost => *theirs != 0 && ours <= theirs,
                    Selector::Density => *ours == DENSITY_ANY as u64 || ours == theirs,
                }
            })
    }

    pub fn is_more_specific_than(&self, other: &Configuration) -> bool {
        self.specificity() > other.specificity()
    }

    /// The language, or `None` when unset.
    pub fn language(&self) -> Option<String> {
        unpack_code(self.language, b'a')
    }

    /// The region, or `None` when unset.
    pub fn country(&self) -> Option<String> {
        unpack_code(self.country, b'0')
    }

    /// BCP-47 style locale tag, for example `en-US`.
    pub fn locale(&self) -> Option<String> {
        let language = self.language()?;
        Some(match self.country() {
            Some(country) => format!("{}-{}", language, country),
            None => language,
        })
    }

    /// Pins the locale. Accepts `en`, `en-US`, `en_US` and the qualifier
    /// form `en-rUS`. An empty string clears it.
    pub fn with_locale(mut self, locale: &str) -> Result<Self> {
        let locale = locale.trim();
        if locale.is_empty() {
            self.language = [0; 2];
            self.country = [0; 2];
            return Ok(self);
        }
        let mut parts = locale.split(|c| c == '-' || c == '_');
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        self.language = pack_code(&language, b'a')
            .ok_or_else(|| Error::Internal(format!("invalid language in locale {:?}", locale)))?;
        self.country = match parts.next() {
            Some(region) => {
                let region = region
                    .strip_prefix('r')
                    .filter(|r| r.len() == 2)
                    .unwrap_or(region)
                    .to_ascii_uppercase();
                pack_code(&region, b'0').ok_or_else(|| {
                    Error::Internal(format!("invalid region in locale {:?}", locale))
                })?
            }
            None => [0; 2],
        };
        Ok(self)
    }

    pub fn with_density(mut self, density: u16) -> Self {
        self.density = density;
        self
    }

    pub fn with_sdk_version(mut self, sdk_version: u16) -> Self {
        self.sdk_version = sdk_version;
        self
    }

    pub fn with_orientation(mut self, orientation: u8) -> Self {
        self.orientation = orientation;
        self
    }
}

#[derive(Clone, Copy, Debug)]
enum Selector {
    Exact,
    AtMost,
    Density,
}

/// Two letter codes are stored as-is. Three letter codes are packed into
/// 15 bits with the high bit set.
fn unpack_code(code: [u8; 2], base: u8) -> Option<String> {
    if code[0] == 0 {
        return None;
    }
    if code[0] & 0x80 != 0 {
        let first = code[0];
        let second = code[1];
        let c0 = second & 0x1f;
        let c1 = ((second & 0xe0) >> 5) | ((first & 0x03) << 3);
        let c2 = (first & 0x7c) >> 2;
        let letters = [c0, c1, c2].map(|c| (base + c) as char);
        return Some(letters.iter().collect());
    }
    Some(code.iter().map(|c| *c as char).collect())
}

fn pack_code(code: &str, base: u8) -> Option<[u8; 2]> {
    let bytes = code.as_bytes();
    if !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    match bytes.len() {
        2 => Some([bytes[0], bytes[1]]),
        3 => {
            let c = bytes
                .iter()
                .map(|b| b.checked_sub(base).filter(|c| *c < 0x20))
                .collect::<Option<Vec<u8>>>()?;
            let first = 0x80 | (c[2] << 2) | (c[1] >> 3);
            let second = ((c[1] & 0x07) << 5) | c[0];
            Some([first, second])
        }
        _ => None,
    }
}

fn density_name(density: u16) -> Option<&'static str> {
    Some(match density {
        DENSITY_LOW => "ldpi",
        DENSITY_MEDIUM => "mdpi",
        DENSITY_TV => "tvdpi",
        DENSITY_HIGH => "hdpi",
        DENSITY_XHIGH => "xhdpi",
        DENSITY_XXHIGH => "xxhdpi",
        DENSITY_XXXHIGH => "xxxhdpi",
        DENSITY_ANY => "anydpi",
        DENSITY_NONE => "nodpi",
        _ => return None,
    })
}

/// Renders the qualifier suffix of a resource directory, such as
/// `en-rUS-land-xhdpi-v21`, or `default`.
impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut parts = vec![];
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            parts.push(format!("mnc{}", self.mnc));
        }
        if let Some(language) = self.language() {
            parts.push(language);
        }
        if let Some(country) = self.country() {
            parts.push(format!("r{}", country));
        }
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        match self.orientation {
            0 => {}
            ORIENTATION_PORT => parts.push("port".into()),
            ORIENTATION_LAND => parts.push("land".into()),
            ORIENTATION_SQUARE => parts.push("square".into()),
            other => parts.push(format!("orientation{}", other)),
        }
        if self.density != 0 {
            match density_name(self.density) {
                Some(name) => parts.push(name.into()),
                None => parts.push(format!("{}dpi", self.density)),
            }
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }
        let other = Configuration {
            mcc: 0,
            mnc: 0,
            language: [0; 2],
            country: [0; 2],
            smallest_screen_width_dp: 0,
            screen_width_dp: 0,
            screen_height_dp: 0,
            orientation: 0,
            density: 0,
            sdk_version: 0,
            ..*self
        };
        if !other.is_default() {
            parts.push(format!("+{}", other.specificity()));
        }
        if parts.is_empty() {
            write!(f, "default")
        } else {
            write!(f, "{}", parts.join("-"))
        }
    }
}

impl Configuration {
    /// Decodes a configuration from the head of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(config: &Configuration) -> Vec<u8> {
        let mut buf = vec![];
        config.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn writes_sixty_four_bytes() {
        let config = Configuration::default()
            .with_locale("en-US")
            .unwrap()
            .with_density(DENSITY_XHIGH)
            .with_sdk_version(21);
        let bytes = encoded(&config);
        assert_eq!(bytes.len(), CONFIG_SIZE);
        assert_eq!(Configuration::from_bytes(&bytes).unwrap(), config);
    }

    #[test]
    fn short_records_leave_wildcards() {
        let config = Configuration::default()
            .with_locale("fr")
            .unwrap()
            .with_sdk_version(26);
        let mut bytes = encoded(&config);
        bytes.truncate(28);
        bytes[0] = 28;
        let short = Configuration::from_bytes(&bytes).unwrap();
        assert_eq!(short.language(), Some("fr".into()));
        assert_eq!(short.sdk_version, 26);
        assert_eq!(short.screen_width_dp, 0);
    }

    #[test]
    fn long_records_skip_unknown_fields() {
        let config = Configuration::default().with_sdk_version(34);
        let mut bytes = encoded(&config);
        bytes.extend_from_slice(&[0xaa; 8]);
        bytes[0] = (CONFIG_SIZE + 8) as u8;
        let mut r = Cursor::new(bytes);
        assert_eq!(Configuration::read(&mut r).unwrap(), config);
        assert_eq!(r.position(), (CONFIG_SIZE + 8) as u64);
    }

    #[test]
    fn oversized_record_is_malformed() {
        let mut bytes = encoded(&Configuration::default());
        bytes[..4].copy_from_slice(&0xffff_fff0u32.to_le_bytes());
        assert!(matches!(
            Configuration::from_bytes(&bytes),
            Err(Error::MalformedChunk(_))
        ));
    }

    #[test]
    fn truncated_record_is_malformed() {
        let bytes = encoded(&Configuration::default());
        assert!(matches!(
            Configuration::from_bytes(&bytes[..20]),
            Err(Error::MalformedChunk(_))
        ));
    }

    #[test]
    fn locale_forms() {
        for form in ["en-US", "en_US", "en-rUS"] {
            let config = Configuration::default().with_locale(form).unwrap();
            assert_eq!(config.locale(), Some("en-US".into()));
        }
        let config = Configuration::default().with_locale("fil-PH").unwrap();
        assert_ne!(config.language[0] & 0x80, 0);
        assert_eq!(config.locale(), Some("fil-PH".into()));
        assert!(Configuration::default().with_locale("e").is_err());
        assert_eq!(Configuration::default().locale(), None);
    }

    #[test]
    fn compatibility() {
        let target = Configuration::default()
            .with_locale("en-US")
            .unwrap()
            .with_density(DENSITY_XHIGH)
            .with_sdk_version(30);
        let default = Configuration::default();
        let en = Configuration::default().with_locale("en").unwrap();
        let fr = Configuration::default().with_locale("fr").unwrap();
        let v21 = Configuration::default().with_sdk_version(21);
        let v33 = Configuration::default().with_sdk_version(33);
        let anydpi = Configuration::default().with_density(DENSITY_ANY);
        let hdpi = Configuration::default().with_density(DENSITY_HIGH);

        assert!(default.is_compatible_with(&target));
        assert!(en.with_locale("en-US").unwrap().is_compatible_with(&target));
        assert!(en.is_compatible_with(&target));
        assert!(!en.with_locale("en-GB").unwrap().is_compatible_with(&target));
        assert!(!fr.is_compatible_with(&target));
        assert!(v21.is_compatible_with(&target));
        assert!(!v33.is_compatible_with(&target));
        assert!(anydpi.is_compatible_with(&target));
        assert!(!hdpi.is_compatible_with(&target));
    }

    #[test]
    fn specificity_counts_pinned_selectors() {
        let en_us = Configuration::default().with_locale("en-US").unwrap();
        let en = Configuration::default().with_locale("en").unwrap();
        assert_eq!(Configuration::default().specificity(), 0);
        assert_eq!(en.specificity(), 1);
        assert_eq!(en_us.specificity(), 2);
        assert!(en_us.is_more_specific_than(&en));
        assert!(!en.is_more_specific_than(&en));
    }

    #[test]
    fn qualifier_display() {
        let config = Configuration::default()
            .with_locale("en-US")
            .unwrap()
            .with_orientation(ORIENTATION_LAND)
            .with_density(DENSITY_XHIGH)
            .with_sdk_version(21);
        assert_eq!(config.to_string(), "en-rUS-land-xhdpi-v21");
        assert_eq!(Configuration::default().to_string(), "default");
    }
}
