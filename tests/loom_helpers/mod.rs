use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;

/// Outcomes a model may reach, as `outcome => [observations]`. Each pair is
/// counted every time an execution reports it.
macro_rules! statemap {
    ($($key:literal => [$($value:literal),*$(,)?]),*$(,)?) => {{
        #[allow(unused_mut)]
        let mut map = std::collections::BTreeMap::new();
        $(
            map.insert($key, {
                #[allow(unused_mut)]
                let mut inner = std::collections::BTreeMap::new();
                $(inner.insert($value, std::sync::atomic::AtomicUsize::new(0));)*
                inner
            });
        )*
        let map: &'static _ = Box::leak(Box::new(map));
        map
    }};
}

pub type StateMap = BTreeMap<usize, BTreeMap<usize, AtomicUsize>>;

/// Records one execution. Panics on an outcome missing from the map.
#[track_caller]
pub fn statemap_put(statemap: &'static StateMap, key: usize, value: usize) {
    match statemap.get(&key).map(|map| map.get(&value)) {
        Some(Some(counter)) => {
            counter.fetch_add(1, SeqCst);
        }
        Some(None) => panic!("incorrect state value {key} => {value}"),
        None => panic!("incorrect state key {key} (=> {value})"),
    }
}

/// Checks that every outcome of the map was reached at least once.
#[track_caller]
pub fn statemap_check_exhaustive(statemap: &'static StateMap) {
    for (key, state) in statemap {
        for (value, counter) in state {
            assert!(counter.load(SeqCst) != 0, "{key} => {value} not triggered");
        }
    }
}
