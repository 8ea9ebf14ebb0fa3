//! 64-bit MurmurHash3 mixing, used to key the consistent-hash ring and the
//! sticky table's hash buckets.
//!
//! This is the MurmurHash3 x64 128-bit variant's finalization folded into a
//! single 64-bit output (the low half of the 128-bit digest), matching the
//! "64-bit mixing function" the spec calls for. The constants below are the
//! canonical MurmurHash3 x64 ones; the algorithm is deterministic across
//! runs and platforms, satisfying the "hash function choice must be stable
//! across runs" requirement.

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Hash arbitrary bytes, seeded, to a 64-bit digest.
pub fn murmur3_64(data: &[u8], seed: u64) -> u64 {
    let mut h1: u64 = seed;
    let mut h2: u64 = seed;

    let nblocks = data.len() / 16;
    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;
    let tail_len = tail.len();

    if tail_len > 8 {
        for i in (8..tail_len).rev() {
            k2 ^= (tail[i] as u64) << ((i - 8) * 8);
        }
        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
    }
    if tail_len > 0 {
        let n = tail_len.min(8);
        for i in (0..n).rev() {
            k1 ^= (tail[i] as u64) << (i * 8);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);

    h1
}

/// Hash a backend identifier plus a virtual-node index, for ring
/// construction (e.g. `"host:port#3"`).
pub fn hash_virtual_node(backend_key: &str, vnode_index: u32) -> u64 {
    let composed = format!("{backend_key}#{vnode_index}");
    murmur3_64(composed.as_bytes(), 0)
}
