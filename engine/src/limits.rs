// Marker regions are cubes of REGION_SIZE blocks per side
pub const REGION_SIZE: i32 = 16;
// For fast division
pub const REGION_SIZE_LOG2: i32 = 4;

pub const REGION_VOLUME: usize = (REGION_SIZE as usize).pow(3);

// Upper bounds for the tracked area around the player, in regions per side
pub const MAX_REGION_RADIUS: u32 = 16;
pub const MAX_VERTICAL_REGION_RADIUS: u32 = 8;
