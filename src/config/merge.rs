use super::Config;

/// Recursively merges `src` into `dest`.
///
/// Two lists concatenate with `dest` first, so entries from earlier
/// configuration keep their position and later entries are appended. Two maps
/// merge key by key. Any other pairing is won by `src`, which may replace a
/// map with a scalar and the other way around.
pub fn merge_deep(dest: Config, src: Config) -> Config {
    match (dest, src) {
        (Config::List(mut dest), Config::List(src)) => {
            dest.extend(src);
            Config::List(dest)
        }
        (Config::Map(mut dest), Config::Map(src)) => {
            for (key, value) in src {
                let merged = match dest.remove(&key) {
                    Some(existing) => merge_deep(existing, value),
                    None => value,
                };
                dest.insert(key, merged);
            }
            Config::Map(dest)
        }
        (_, src) => src,
    }
}

/// Merges `src` into `dest` entry by entry, for configuration addressed by
/// position. Entries past the end of `dest` are appended.
pub(crate) fn merge_positional(mut dest: Vec<Config>, src: Vec<Config>) -> Vec<Config> {
    for (index, item) in src.into_iter().enumerate() {
        match dest.get_mut(index) {
            Some(slot) => *slot = merge_deep(std::mem::take(slot), item),
            None => dest.push(item),
        }
    }
    dest
}
