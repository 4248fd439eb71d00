//! Pixel format definitions.
use std::fmt;

/// Generic colour models.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum ColorModel {
    RGB(RGBSubmodel),
}

impl fmt::Display for ColorModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ColorModel::RGB(fmt) => write!(f, "RGB({})", fmt),
        }
    }
}

/// RGB family submodels.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum RGBSubmodel {
    RGB,
    SRGB,
}

impl fmt::Display for RGBSubmodel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            RGBSubmodel::RGB  => "RGB",
            RGBSubmodel::SRGB => "sRGB",
        };
        write!(f, "{}", name)
    }
}

/// Single colourspace component definition.
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct NAPixelChromaton {
    /// Horizontal subsampling in power of two.
    pub h_ss:      u8,
    /// Vertical subsampling in power of two.
    pub v_ss:      u8,
    /// A flag to signal that component is packed.
    pub packed:    bool,
    /// Bit depth of the component.
    pub depth:     u8,
    /// Shift for packed components.
    pub shift:     u8,
    /// Component offset for byte-packed components.
    pub comp_offs: u8,
    /// The distance to the next packed element in bytes.
    pub next_elem: u8,
}

macro_rules! chromaton {
    ($hs: expr, $vs: expr, $pck: expr, $d: expr, $sh: expr, $co: expr, $ne: expr) => ({
        Some(NAPixelChromaton { h_ss: $hs, v_ss: $vs, packed: $pck, depth: $d, shift: $sh, comp_offs: $co, next_elem: $ne })
    });
    (packrgb; $d: expr, $s: expr, $co: expr, $ne: expr) => ({
        Some(NAPixelChromaton { h_ss: 0, v_ss: 0, packed: true, depth: $d, shift: $s, comp_offs: $co, next_elem: $ne })
    });
}

/// Image colourspace representation.
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct NAPixelFormaton {
    /// Image colour model.
    pub model:      ColorModel,
    /// Number of components.
    pub components: u8,
    /// Component definitions.
    pub comp_info:  [Option<NAPixelChromaton>; 5],
    /// Single pixel size for packed formats.
    pub elem_size:  u8,
    /// A flag to signal that data is stored as big-endian.
    pub be:         bool,
    /// A flag to signal the format has alpha component.
    pub alpha:      bool,
    /// A flag to signal the format is paletted.
    pub palette:    bool,
}

/// Predefined format for RGB565 packed video.
pub const RGB565_FORMAT: NAPixelFormaton = NAPixelFormaton { model: ColorModel::RGB(RGBSubmodel::RGB), components: 3,
                                        comp_info: [
                                            chromaton!(packrgb; 5, 11, 0, 2),
                                            chromaton!(packrgb; 6,  5, 0, 2),
                                            chromaton!(packrgb; 5,  0, 0, 2),
                                            None, None],
                                        elem_size: 2, be: false, alpha: false, palette: false };

impl NAPixelChromaton {
    /// Returns subsampling for the current component.
    pub fn get_subsampling(self) -> (u8, u8) { (self.h_ss, self.v_ss) }
    /// Reports whether current component is packed.
    pub fn is_packed(self) -> bool { self.packed }
    /// Returns bit depth of the current component.
    pub fn get_depth(self) -> u8 { self.depth }
    /// Returns bit shift for packed component.
    pub fn get_shift(self) -> u8 { self.shift }
    /// Returns component width for the provided image width.
    pub fn get_width(self, width: usize) -> usize {
        (width + ((1 << self.h_ss) - 1)) >> self.h_ss
    }
    /// Returns component height for the provided image height.
    pub fn get_height(self, height: usize) -> usize {
        (height + ((1 << self.v_ss) - 1)) >> self.v_ss
    }
}

impl fmt::Display for NAPixelChromaton {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pfmt = if self.packed {
                let mask = ((1 << self.depth) - 1) << self.shift;
                format!("packed(+{},{:X}, step {})", self.comp_offs, mask, self.next_elem)
            } else {
                format!("planar({},{})", self.comp_offs, self.next_elem)
            };
        write!(f, "({}x{}, {})", self.h_ss, self.v_ss, pfmt)
    }
}

impl NAPixelFormaton {
    /// Returns the colour model.
    pub fn get_model(&self) -> ColorModel { self.model }
    /// Returns the number of components.
    pub fn get_num_comp(&self) -> usize { self.components as usize }
    /// Returns the definition of the requested component.
    pub fn get_chromaton(&self, idx: usize) -> Option<NAPixelChromaton> {
        if idx < self.comp_info.len() { return self.comp_info[idx]; }
        None
    }
    /// Reports whether the format has alpha.
    pub fn has_alpha(&self) -> bool { self.alpha }
    /// Reports whether the format is paletted.
    pub fn is_paletted(&self) -> bool { self.palette }
    /// Returns single packed pixel size.
    pub fn get_elem_size(&self) -> u8 { self.elem_size }
    /// Returns the total amount of bits needed for all components.
    pub fn get_total_depth(&self) -> u8 {
        let mut depth = 0;
        for chromaton in self.comp_info.iter().flatten() {
            depth += chromaton.depth;
        }
        depth
    }
}

impl fmt::Display for NAPixelFormaton {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let end = if self.be { "BE" } else { "LE" };
        let palstr = if self.palette { "palette " } else { "" };
        let astr = if self.alpha { "alpha " } else { "" };
        let mut string = format!("Formaton for {} ({}{}elem {} size {}): ", self.model, palstr, astr, end, self.elem_size);
        for i in self.comp_info.iter() {
            if let Some(chr) = i {
                string = format!("{} {}", string, chr);
            }
        }
        write!(f, "{}", string)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fmt() {
        println!("formaton rgb565- {}", RGB565_FORMAT);
        assert_eq!(RGB565_FORMAT.get_total_depth(), 16);
        assert_eq!(RGB565_FORMAT.get_elem_size(), 2);
        assert!(!RGB565_FORMAT.is_paletted());
        assert_eq!(RGB565_FORMAT.get_chromaton(1).unwrap().get_shift(), 5);
    }
}
