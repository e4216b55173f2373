use crate::objects::object_string::ObjectString;
use crate::value::{self, Value};

const MAX_LOAD: f64 = 0.75;

#[derive(Clone, Copy)]
struct Entry {
    key: *mut ObjectString,
    value: Value,
    tombstone: bool,
}

impl Entry {
    fn empty() -> Entry {
        Entry { key: std::ptr::null_mut(), value: value::nil(), tombstone: false }
    }
}

/// Open-addressed hash table with linear probing, power-of-two capacity and tombstone
/// deletion. Keys are raw pointers to interned `ObjectString`s, so key comparison is
/// pointer equality and lookup-by-text goes through `find_string`, which is the one path
/// that compares raw bytes (used to answer "does this string already exist?" before an
/// `ObjectString` is even allocated).
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Table {
    pub fn new() -> Table {
        Table { entries: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_entry(entries: &[Entry], capacity: usize, key: *mut ObjectString) -> usize {
        let hash = unsafe { (*key).hash };
        let mut index = (hash as usize) & (capacity - 1);
        let mut first_tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            if entry.key.is_null() {
                if entry.tombstone {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                } else {
                    return first_tombstone.unwrap_or(index);
                }
            } else if std::ptr::eq(entry.key, key) {
                return index;
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.capacity() < 8 { 8 } else { self.capacity() * 2 };
        let mut new_entries = vec![Entry::empty(); new_capacity];
        self.count = 0;
        for entry in self.entries.iter() {
            if entry.key.is_null() {
                continue;
            }
            let index = Self::find_entry(&new_entries, new_capacity, entry.key);
            new_entries[index] = *entry;
            self.count += 1;
        }
        self.entries = new_entries;
    }

    /// Inserts or overwrites. Returns `true` if this created a brand new key.
    pub fn set(&mut self, key: *mut ObjectString, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            self.grow();
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_null();
        if is_new_key && !entry.tombstone {
            self.count += 1;
        }
        entry.key = key;
        entry.value = value;
        entry.tombstone = false;
        is_new_key
    }

    pub fn get(&self, key: *mut ObjectString) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key);
        let entry = &self.entries[index];
        if entry.key.is_null() {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Tombstones the slot rather than clearing it, so later probes don't stop short of
    /// keys that hashed past this slot.
    pub fn delete(&mut self, key: *mut ObjectString) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key);
        let entry = &mut self.entries[index];
        if entry.key.is_null() {
            return false;
        }
        entry.key = std::ptr::null_mut();
        entry.value = value::nil();
        entry.tombstone = true;
        true
    }

    /// Raw byte comparison lookup used by string interning, before any `ObjectString` for
    /// `chars` has been allocated.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<*mut ObjectString> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            if entry.key.is_null() {
                if !entry.tombstone {
                    return None;
                }
            } else {
                let candidate = unsafe { &*entry.key };
                if candidate.hash == hash && candidate.content == chars {
                    return Some(entry.key);
                }
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    pub fn copy_all_into(&self, dest: &mut Table) {
        for entry in self.entries.iter() {
            if !entry.key.is_null() {
                dest.set(entry.key, entry.value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (*mut ObjectString, Value)> + '_ {
        self.entries.iter().filter(|e| !e.key.is_null()).map(|e| (e.key, e.value))
    }

    /// Drops every entry whose key is an unmarked string, used by the GC's weak pass over
    /// the intern table (a string reachable only from the intern table must not keep it
    /// alive through the next collection).
    pub fn remove_white(&mut self) {
        let doomed: Vec<*mut ObjectString> = self
            .entries
            .iter()
            .filter(|e| !e.key.is_null())
            .filter(|e| unsafe { !(*e.key).object.marked })
            .map(|e| e.key)
            .collect();
        for key in doomed {
            self.delete(key);
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_string::ObjectString;

    fn leak(s: &str) -> *mut ObjectString {
        Box::into_raw(ObjectString::new(s))
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut table = Table::new();
        let key = leak("foo");
        assert!(table.set(key, value::number(1.0)));
        assert_eq!(table.get(key).unwrap().as_number(), 1.0);
        assert!(!table.set(key, value::number(2.0)));
        assert_eq!(table.get(key).unwrap().as_number(), 2.0);
    }

    #[test]
    fn delete_then_get_returns_none_but_probe_chain_survives() {
        let mut table = Table::new();
        let a = leak("a");
        let b = leak("b");
        table.set(a, value::number(1.0));
        table.set(b, value::number(2.0));
        assert!(table.delete(a));
        assert_eq!(table.get(a), None);
        assert_eq!(table.get(b).unwrap().as_number(), 2.0);
    }

    #[test]
    fn find_string_matches_on_bytes_not_pointer() {
        let mut table = Table::new();
        let key = leak("hello");
        table.set(key, value::nil());
        let found = table.find_string("hello", unsafe { (*key).hash }).unwrap();
        assert!(std::ptr::eq(found, key));
        assert!(table.find_string("goodbye", 0).is_none());
    }

    #[test]
    fn grows_before_exceeding_load_factor() {
        let mut table = Table::new();
        for i in 0..64 {
            let key = leak(&format!("k{i}"));
            table.set(key, value::number(i as f64));
        }
        assert_eq!(table.len(), 64);
        for i in 0..64 {
            let key = leak(&format!("k{i}"));
            assert_eq!(table.find_string(&format!("k{i}"), unsafe { (*key).hash }).is_some(), true);
        }
    }
}
