/// The live operator table: spelling → (left, right) binding powers.
///
/// Open addressing with linear probing over a fixed 1024-slot array. The
/// table never resizes; once it is full, `define` reports failure and the
/// binding is dropped. A spelling that is already present is never
/// overwritten, which is how redefinition attempts are ignored.
///
/// The table also owns the priority counter shared by every operator
/// definition of a run, so defaults stay strictly increasing across
/// parser instances.
pub const CAPACITY: usize = 1024;

/// djb2 over the spelling's bytes. Capacity is a power of two, so the
/// caller reduces with a mask.
pub(crate) fn hash(key: &str) -> u32 {
    let mut h = 5381u32;
    for &b in key.as_bytes() {
        h = h.wrapping_shl(5).wrapping_add(h).wrapping_add(u32::from(b));
    }
    h
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    lbp: i32,
    rbp: i32,
}

#[derive(Debug)]
pub struct OpTable {
    slots: Vec<Option<Entry>>,
    next_priority: i32,
}

impl Default for OpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OpTable {
    pub fn new() -> Self {
        OpTable {
            slots: vec![None; CAPACITY],
            next_priority: 0,
        }
    }

    /// Hands out the next priority. Strictly increasing for the lifetime
    /// of the table, regardless of whether the definition that asked for
    /// it ends up installed.
    pub fn allocate_priority(&mut self) -> i32 {
        self.next_priority += 1;
        self.next_priority
    }

    pub fn define(&mut self, name: &str, lbp: i32, rbp: i32) -> bool {
        let mask = CAPACITY - 1;
        let mut i = hash(name) as usize & mask;
        for _ in 0..CAPACITY {
            match &self.slots[i] {
                None => {
                    self.slots[i] = Some(Entry {
                        name: name.to_owned(),
                        lbp,
                        rbp,
                    });
                    return true;
                }
                Some(entry) if entry.name == name => return false,
                Some(_) => i = (i + 1) & mask,
            }
        }
        false
    }

    pub fn find(&self, name: &str) -> Option<(i32, i32)> {
        let mask = CAPACITY - 1;
        let mut i = hash(name) as usize & mask;
        for _ in 0..CAPACITY {
            match &self.slots[i] {
                None => return None,
                Some(entry) if entry.name == name => return Some((entry.lbp, entry.rbp)),
                Some(_) => i = (i + 1) & mask,
            }
        }
        None
    }

    /// Right binding power, if `name` is a prefix operator.
    pub fn prefix(&self, name: &str) -> Option<i32> {
        match self.find(name) {
            Some((0, rbp)) if rbp != 0 => Some(rbp),
            _ => None,
        }
    }

    /// Left binding power, if `name` is a postfix operator.
    pub fn postfix(&self, name: &str) -> Option<i32> {
        match self.find(name) {
            Some((lbp, 0)) if lbp != 0 => Some(lbp),
            _ => None,
        }
    }

    /// Both binding powers, if `name` is an infix operator.
    pub fn infix(&self, name: &str) -> Option<(i32, i32)> {
        match self.find(name) {
            Some((lbp, rbp)) if lbp != 0 && rbp != 0 => Some((lbp, rbp)),
            _ => None,
        }
    }
}
