#![no_main]

use libfuzzer_sys::fuzz_target;
use libfuzzer_sys::arbitrary::{Arbitrary, Result, Unstructured};

use printmodel::paint::{FacetState, FacetsAnnotation};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug)]
struct FuzzPaint {
    entries: Vec<(u32, String)>,
    states: Vec<(u32, u8)>,
}

impl<'a> Arbitrary<'a> for FuzzPaint {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        // The append-only decode path requires strictly increasing facet
        // indices and uppercase hex digits, so generate entries that honor
        // that contract instead of tripping its debug assertions.
        let entry_count = u.int_in_range(0..=64)?;
        let mut entries = Vec::new();
        let mut next_idx: u32 = 0;
        for _ in 0..entry_count {
            let idx = next_idx + u.int_in_range(0..=1000u32)?;
            let digit_count = u.int_in_range(1..=8)?;
            let mut hex = String::new();
            for _ in 0..digit_count {
                let digit: u8 = u.int_in_range(0..=15)?;
                hex.push(HEX[digit as usize] as char);
            }
            entries.push((idx, hex));
            next_idx = idx + 1;
        }

        // The replace path sorts and filters internally, so these pairs
        // need no constraining at all.
        let state_count = u.int_in_range(0..=64)?;
        let mut states = Vec::new();
        for _ in 0..state_count {
            states.push((u.arbitrary()?, u.int_in_range(0..=15)?));
        }

        Ok(FuzzPaint { entries, states })
    }
}

fuzz_target!(|data: FuzzPaint| {
    let mut annotation = FacetsAnnotation::new();
    for (idx, hex) in &data.entries {
        annotation.set_facet_from_hex(*idx, hex);
    }

    // Export must reproduce every payload digit for digit, leading
    // zeros included.
    for (idx, hex) in &data.entries {
        assert_eq!(annotation.facet_to_hex(*idx).as_deref(), Some(hex.as_str()));
        let _ = annotation.facet_state(*idx);
    }

    let indices = annotation.facet_indices();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
    assert!(annotation.state_indices().iter().all(|&s| (1..=15).contains(&s)));

    let pairs: Vec<(u32, FacetState)> = data
        .states
        .iter()
        .map(|&(idx, code)| {
            let state = if code == 0 {
                FacetState::NONE
            } else {
                FacetState::extruder(code)
            };
            (idx, state)
        })
        .collect();
    let mut replaced = FacetsAnnotation::new();
    replaced.set_facet_states(&pairs);
    // Re-applying identical content must not register as a change.
    assert!(!replaced.set_facet_states(&pairs));
});
