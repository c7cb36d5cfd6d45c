// Macro to create a bitmask
#[macro_export]
macro_rules! bitmask {
    ( $start_bit:expr,$width:expr ) => {{ ((1 << $width) - 1) << $start_bit }};
    ( $end_bit:expr;$start_bit:expr ) => {
        bitmask!($start_bit, $end_bit - $start_bit + 1)
    };
    ( $width:expr ) => {
        bitmask!(0, $width)
    };
}

// Macro to extract bits from a value
#[macro_export]
macro_rules! bits {
    ( $val:expr,$start_bit:expr,$width:expr ) => {{ ($val >> $start_bit) & ((1 << $width) - 1) }};
    ( $val:expr,$end_bit:expr;$start_bit:expr ) => {
        bits!($val, $start_bit, $end_bit - $start_bit + 1)
    };
    ( $val:expr,$bit:expr ) => {
        bits!($val, $bit, 1)
    };
}

/// Mask a value down to its lowest `width` bits.
/// Unlike `bitmask!` this is well defined for a full-width mask.
pub fn truncate(value: u32, width: u32) -> u32 {
    if width >= u32::BITS {
        value
    } else {
        value & ((1 << width) - 1)
    }
}

/// Sign of a 32 bit word in two's complement.
pub fn sign_bit(value: u32) -> bool {
    bits!(value, 31) == 1
}

#[test]
fn test_bits() {
    let ten = 0b1010;

    assert_eq!(bits!(ten, 0), 0b0);
    assert_eq!(bits!(ten, 1), 0b1);
    assert_eq!(bits!(ten, 2), 0b0);
    assert_eq!(bits!(ten, 3), 0b1);

    assert_eq!(bits!(ten, 0, 2), 0b10);
    assert_eq!(bits!(ten, 1, 3), 0b101);
    assert_eq!(bits!(ten, 3;1), 0b101);
}

#[test]
fn test_bits_wide() {
    let word: u128 = 0b10101 << 123;
    assert_eq!(bits!(word, 123, 5), 0b10101);
    assert_eq!(bits!(word, 127;123), 0b10101);
    assert_eq!(bitmask!(120, 8) & word, word);
}

#[test]
fn test_bitmask() {
    assert_eq!(bitmask!(0, 5), 0b11111);
    assert_eq!(bitmask!(10;5), 0b11111100000);
    assert_eq!(bitmask!(5), 0b11111);
}

#[test]
fn test_truncate() {
    assert_eq!(truncate(0xFFFF_FFFF, 4), 0xF);
    assert_eq!(truncate(0xFFFF_FFFF, 32), 0xFFFF_FFFF);
    assert_eq!(truncate(0x1234, 0), 0);
}
