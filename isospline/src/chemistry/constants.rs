// Purpose: To store constants that are used in the program
// Averagine model (Senko et al.), atoms per residue of 111.1254 Da
pub const AVERAGINE_RESIDUE_MASS: f64 = 111.1254;
pub const AVERAGINE_C: f64 = 4.9384;
pub const AVERAGINE_H: f64 = 7.7583;
pub const AVERAGINE_N: f64 = 1.3577;
pub const AVERAGINE_O: f64 = 1.4773;
pub const AVERAGINE_S: f64 = 0.0417;

// Spline orders accepted by the model loader
pub const CUBIC_SPLINE_ORDER: u32 = 4;
pub const BICUBIC_PATCH_COEFFICIENTS: usize = 16;
