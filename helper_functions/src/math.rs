use integer_sqrt::IntegerSquareRoot as _;
use types::primitives::H256;

// endianness is not configurable
pub fn int_to_bytes(int: u64, length: usize) -> Vec<u8> {
    let mut vec = int.to_le_bytes().to_vec();
    vec.resize(length, 0);
    vec
}

pub fn bytes_to_int(bytes: [u8; 8]) -> u64 {
    u64::from_le_bytes(bytes)
}

pub fn integer_squareroot(n: u64) -> u64 {
    n.integer_sqrt()
}

pub fn xor(left: &H256, right: &H256) -> H256 {
    let mut result = [0; 32];
    for (index, byte) in result.iter_mut().enumerate() {
        *byte = left[index] ^ right[index];
    }
    H256::from(result)
}
