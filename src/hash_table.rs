use core::alloc::Layout;
use core::alloc::LayoutError;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::error::Error;
use crate::sizing;

/// Metadata byte of a slot that has never held an entry.
const EMPTY: u8 = 0xFF;

/// Metadata byte of a slot whose entry was removed since the last resize.
const TOMBSTONE: u8 = 0xFE;

/// Largest displacement a slot can record.
///
/// A probe that would have to step past this distance fails with
/// [`Error::CapacityExhausted`].
pub const MAX_DISPLACEMENT: u8 = TOMBSTONE - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Empty,
    Tombstone,
    Occupied(u8),
}

/// Per-slot metadata byte: one of the two sentinels or the displacement of
/// the live entry stored in the slot.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct Meta(u8);

impl Meta {
    const EMPTY: Meta = Meta(EMPTY);
    const TOMBSTONE: Meta = Meta(TOMBSTONE);

    #[inline(always)]
    fn occupied(displacement: u8) -> Self {
        debug_assert!(displacement <= MAX_DISPLACEMENT);
        Meta(displacement)
    }

    #[inline(always)]
    fn state(self) -> SlotState {
        match self.0 {
            EMPTY => SlotState::Empty,
            TOMBSTONE => SlotState::Tombstone,
            displacement => SlotState::Occupied(displacement),
        }
    }

    #[inline(always)]
    fn is_occupied(self) -> bool {
        self.0 < TOMBSTONE
    }
}

/// Distance of `index` from the ideal slot of `hash`.
#[inline(always)]
fn displacement_of(index: usize, hash: u64, mask: usize) -> u8 {
    (index.wrapping_sub(hash as usize) & mask) as u8
}

#[inline(always)]
fn next_displacement(displacement: u8) -> Result<u8, Error> {
    if displacement >= MAX_DISPLACEMENT {
        Err(Error::CapacityExhausted)
    } else {
        Ok(displacement + 1)
    }
}

/// Offsets of the four parallel arrays inside the single slot allocation.
/// Metadata always starts at offset 0.
#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    hashes_offset: usize,
    keys_offset: usize,
    values_offset: usize,
}

impl DataLayout {
    fn new<K, V>(capacity: usize) -> Result<Self, Error> {
        let overflow = |_: LayoutError| Error::CapacityOverflow;

        let meta_layout = Layout::array::<Meta>(capacity).map_err(overflow)?;
        let hashes_layout = Layout::array::<MaybeUninit<u64>>(capacity).map_err(overflow)?;
        let keys_layout = Layout::array::<MaybeUninit<K>>(capacity).map_err(overflow)?;
        let values_layout = Layout::array::<MaybeUninit<V>>(capacity).map_err(overflow)?;

        let (layout, hashes_offset) = meta_layout.extend(hashes_layout).map_err(overflow)?;
        let (layout, keys_offset) = layout.extend(keys_layout).map_err(overflow)?;
        let (layout, values_offset) = layout.extend(values_layout).map_err(overflow)?;

        Ok(DataLayout {
            layout: layout.pad_to_align(),
            hashes_offset,
            keys_offset,
            values_offset,
        })
    }
}

/// Mutable views of the four slot arrays, borrowed together.
struct SlotsMut<'a, K, V> {
    meta: &'a mut [Meta],
    hashes: &'a mut [MaybeUninit<u64>],
    keys: &'a mut [MaybeUninit<K>],
    values: &'a mut [MaybeUninit<V>],
}

/// Slot storage: metadata, cached hashes, keys and values for a power-of-two
/// number of slots, carved out of one allocation.
///
/// Keys and values are initialized exactly for the slots whose metadata is
/// occupied, and dropping the storage drops those entries. Hashes are also
/// initialized for tombstones: a tombstone keeps the displacement of the
/// entry it replaced.
struct Slots<K, V> {
    alloc: NonNull<u8>,
    layout: DataLayout,
    capacity: usize,
    _phantom: PhantomData<(K, V)>,
}

// SAFETY: `Slots` exclusively owns the keys and values stored in its
// allocation, the same way a `Vec<(K, V)>` does.
unsafe impl<K: Send, V: Send> Send for Slots<K, V> {}
// SAFETY: shared access only hands out shared references to keys and values.
unsafe impl<K: Sync, V: Sync> Sync for Slots<K, V> {}

impl<K, V> Slots<K, V> {
    fn try_allocate(capacity: usize) -> Result<Self, Error> {
        debug_assert!(capacity.is_power_of_two());

        let layout = DataLayout::new::<K, V>(capacity)?;
        // SAFETY: the metadata array holds at least one byte, so the layout has a
        // non-zero size. A null return is reported instead of dereferenced, and
        // the first `capacity` bytes belong to the metadata array.
        let alloc = unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            let Some(alloc) = NonNull::new(raw_alloc) else {
                return Err(Error::AllocError {
                    layout: layout.layout,
                });
            };
            core::ptr::write_bytes(raw_alloc, EMPTY, capacity);
            alloc
        };

        Ok(Self {
            alloc,
            layout,
            capacity,
            _phantom: PhantomData,
        })
    }

    fn meta(&self) -> &[Meta] {
        // SAFETY: the metadata array starts at offset 0 and every byte was
        // initialized on allocation.
        unsafe { core::slice::from_raw_parts(self.alloc.as_ptr().cast::<Meta>(), self.capacity) }
    }

    fn hashes(&self) -> &[MaybeUninit<u64>] {
        // SAFETY: the offset and length come from the layout this allocation
        // was made with.
        unsafe {
            core::slice::from_raw_parts(
                self.alloc.add(self.layout.hashes_offset).cast::<MaybeUninit<u64>>().as_ptr(),
                self.capacity,
            )
        }
    }

    fn keys(&self) -> &[MaybeUninit<K>] {
        // SAFETY: the offset and length come from the layout this allocation
        // was made with.
        unsafe {
            core::slice::from_raw_parts(
                self.alloc.add(self.layout.keys_offset).cast::<MaybeUninit<K>>().as_ptr(),
                self.capacity,
            )
        }
    }

    fn values(&self) -> &[MaybeUninit<V>] {
        // SAFETY: the offset and length come from the layout this allocation
        // was made with.
        unsafe {
            core::slice::from_raw_parts(
                self.alloc.add(self.layout.values_offset).cast::<MaybeUninit<V>>().as_ptr(),
                self.capacity,
            )
        }
    }

    fn values_mut(&mut self) -> &mut [MaybeUninit<V>] {
        self.parts_mut().values
    }

    fn parts_mut(&mut self) -> SlotsMut<'_, K, V> {
        // SAFETY: the four arrays occupy disjoint ranges of the allocation, so
        // handing out one mutable slice per array does not alias.
        unsafe {
            SlotsMut {
                meta: core::slice::from_raw_parts_mut(
                    self.alloc.as_ptr().cast::<Meta>(),
                    self.capacity,
                ),
                hashes: core::slice::from_raw_parts_mut(
                    self.alloc.add(self.layout.hashes_offset).cast::<MaybeUninit<u64>>().as_ptr(),
                    self.capacity,
                ),
                keys: core::slice::from_raw_parts_mut(
                    self.alloc.add(self.layout.keys_offset).cast::<MaybeUninit<K>>().as_ptr(),
                    self.capacity,
                ),
                values: core::slice::from_raw_parts_mut(
                    self.alloc.add(self.layout.values_offset).cast::<MaybeUninit<V>>().as_ptr(),
                    self.capacity,
                ),
            }
        }
    }

    /// Forgets every entry without dropping it. Used once entries have been
    /// moved elsewhere, or were never written.
    fn mark_all_empty(&mut self) {
        self.parts_mut().meta.fill(Meta::EMPTY);
    }
}

impl<K, V> Drop for Slots<K, V> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<K>() || core::mem::needs_drop::<V>() {
            let slots = self.parts_mut();
            for (index, meta) in slots.meta.iter().enumerate() {
                if meta.is_occupied() {
                    // SAFETY: occupied slots hold an initialized key and value.
                    unsafe {
                        slots.keys[index].assume_init_drop();
                        slots.values[index].assume_init_drop();
                    }
                }
            }
        }

        // SAFETY: `alloc` was returned by the global allocator for this layout.
        unsafe {
            alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

/// Moves the placement of every live entry of `old` into `fresh` without
/// touching keys or values.
///
/// Robin Hood placement only depends on hashes and displacements, so the
/// hash array of `fresh` temporarily records the *source slot index* of each
/// planned entry. Nothing is moved until the whole plan fits.
fn plan_relocation<K, V>(old: &Slots<K, V>, fresh: &mut Slots<K, V>) -> Result<(), Error> {
    let capacity = fresh.capacity;
    let mask = capacity - 1;
    let old_hashes = old.hashes();
    let new = fresh.parts_mut();

    for (source, meta) in old.meta().iter().enumerate() {
        if !meta.is_occupied() {
            continue;
        }

        // SAFETY: occupied slots hold an initialized hash.
        let hash = unsafe { old_hashes[source].assume_init_read() };
        let mut index = hash as usize & mask;
        let mut displacement = 0u8;
        let mut source = source as u64;
        let mut placed = false;

        for _ in 0..capacity {
            match new.meta[index].state() {
                SlotState::Empty => {
                    new.meta[index] = Meta::occupied(displacement);
                    new.hashes[index] = MaybeUninit::new(source);
                    placed = true;
                    break;
                }
                SlotState::Occupied(resident) if resident < displacement => {
                    new.meta[index] = Meta::occupied(displacement);
                    displacement = resident;
                    // SAFETY: planned slots hold an initialized source index.
                    source = unsafe {
                        core::mem::replace(&mut new.hashes[index], MaybeUninit::new(source))
                            .assume_init()
                    };
                }
                SlotState::Occupied(_) | SlotState::Tombstone => {}
            }

            index = (index + 1) & mask;
            displacement = next_displacement(displacement)?;
        }

        if !placed {
            return Err(Error::CapacityExhausted);
        }
    }

    Ok(())
}

/// Outcome of an insertion probe.
enum Probe {
    /// The key lives at this slot.
    Found(usize),
    /// The key is absent and belongs at this slot with this displacement.
    /// Any resident there is evicted forward when the entry is written.
    Vacant { index: usize, displacement: u8 },
}

impl Probe {
    /// A vacancy at the reusable tombstone if one was passed, else here.
    #[inline(always)]
    fn vacant(reusable: Option<(usize, u8)>, index: usize, displacement: u8) -> Self {
        let (index, displacement) = reusable.unwrap_or((index, displacement));
        Probe::Vacant {
            index,
            displacement,
        }
    }
}

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries.
    pub len: usize,
    /// Number of tombstoned slots awaiting the next resize.
    pub tombstones: usize,
    /// Number of slots.
    pub capacity: usize,
    /// `(len + tombstones) / capacity`.
    pub load_factor: f64,
    /// Largest displacement of any live entry.
    pub max_displacement: usize,
    /// Mean displacement over live entries.
    pub mean_displacement: f64,
    /// Size of the slot allocation in bytes.
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {} live + {} tombstones / {} slots ({:.2}% load factor)",
            self.len,
            self.tombstones,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Displacement: max {}, mean {:.3}",
            self.max_displacement, self.mean_displacement
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// An open-addressing hash table using Robin Hood displacement.
///
/// `HashTable<K, V>` stores keys and values in parallel slot arrays next to a
/// one-byte metadata array and the cached 64-bit hash of every key. Like the
/// raw tables of other hashing crates it does not hash anything itself:
/// every operation takes the hash of the key and an equality predicate over
/// stored keys. [`HashMap`](crate::HashMap) wraps it with a `BuildHasher`.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 byte of metadata plus a `u64` hash per slot, plus the size
///   of `K` and `V`. The slot count is a power of two.
/// - **Probing**: entries are kept ordered by displacement along each probe
///   run, so a lookup stops as soon as it meets an entry closer to home than
///   the distance it has already travelled.
/// - **Deletion**: removed entries leave a tombstone which is reused by later
///   insertions and reclaimed by the next resize.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_hood_map::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table: HashTable<u64, String> = HashTable::with_capacity(100);
///
/// table
///     .try_insert(hash_id(123), 123, "Alice".to_string(), |&id| id == 123)
///     .unwrap();
///
/// let (_, name) = table.find(hash_id(123), |&id| id == 123).unwrap();
/// assert_eq!(name, "Alice");
/// ```
pub struct HashTable<K, V> {
    slots: Slots<K, V>,
    len: usize,
    tombstones: usize,
}

impl<K, V> Debug for HashTable<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;
        use alloc::vec::Vec;

        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.capacity())
            .field(
                "metadata",
                &self
                    .slots
                    .meta()
                    .chunks(16)
                    .map(|row| {
                        row.iter()
                            .map(|meta| match meta.state() {
                                SlotState::Empty => "..".to_string(),
                                SlotState::Tombstone => "xx".to_string(),
                                SlotState::Occupied(displacement) => {
                                    format!("{displacement:02x}")
                                }
                            })
                            .collect::<Vec<String>>()
                            .join(", ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> Clone for HashTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        let mut slots: Slots<K, V> =
            Slots::try_allocate(self.capacity()).unwrap_or_else(|err| err.raise());

        {
            let dst = slots.parts_mut();
            let src_meta = self.slots.meta();
            let src_hashes = self.slots.hashes();
            let src_keys = self.slots.keys();
            let src_values = self.slots.values();

            for index in 0..src_meta.len() {
                match src_meta[index].state() {
                    SlotState::Empty => {}
                    SlotState::Tombstone => {
                        dst.hashes[index] = src_hashes[index];
                        dst.meta[index] = Meta::TOMBSTONE;
                    }
                    SlotState::Occupied(_) => {
                        // SAFETY: occupied slots hold an initialized key and value.
                        let (key, value) = unsafe {
                            (
                                src_keys[index].assume_init_ref().clone(),
                                src_values[index].assume_init_ref().clone(),
                            )
                        };
                        dst.hashes[index] = src_hashes[index];
                        dst.keys[index] = MaybeUninit::new(key);
                        dst.values[index] = MaybeUninit::new(value);
                        // Metadata last: a panicking clone leaves the slot empty.
                        dst.meta[index] = src_meta[index];
                    }
                }
            }
        }

        Self {
            slots,
            len: self.len,
            tombstones: self.tombstones,
        }
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates a new hash table with at least the given number of slots.
    ///
    /// A capacity of 0 selects [`DEFAULT_CAPACITY`](sizing::DEFAULT_CAPACITY);
    /// anything else is rounded up to a power of two.
    ///
    /// # Panics
    ///
    /// Panics if the capacity overflows and aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if the
    /// allocator fails. See [`try_with_capacity`](Self::try_with_capacity).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64, String> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 128);
    ///
    /// let table: HashTable<u64, String> = HashTable::with_capacity(0);
    /// assert_eq!(table.capacity(), 32);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).unwrap_or_else(|err| err.raise())
    }

    /// Creates a new hash table, reporting allocation failures instead of
    /// aborting.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::Error;
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let table = HashTable::<u64, u64>::try_with_capacity(1000).unwrap();
    /// assert_eq!(table.capacity(), 1024);
    ///
    /// let err = HashTable::<u64, u64>::try_with_capacity(usize::MAX).unwrap_err();
    /// assert_eq!(err, Error::CapacityOverflow);
    /// ```
    pub fn try_with_capacity(capacity: usize) -> Result<Self, Error> {
        let capacity = sizing::capacity_for(capacity)?;
        Ok(Self {
            slots: Slots::try_allocate(capacity)?,
            len: 0,
            tombstones: 0,
        })
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots. Always a power of two.
    ///
    /// The table grows once live entries plus tombstones would exceed the
    /// configured fraction of this number.
    pub fn capacity(&self) -> usize {
        self.slots.capacity
    }

    /// Returns the number of tombstoned slots awaiting the next resize.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.capacity - 1
    }

    /// Number of slots a probe may visit: every representable displacement,
    /// but never more than the whole table.
    #[inline(always)]
    fn probe_limit(&self) -> usize {
        self.slots.capacity.min(MAX_DISPLACEMENT as usize + 1)
    }

    /// Finds a value in the table by hash and equality predicate.
    ///
    /// Returns the stored key and value, or `None` if no stored key matches.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hood_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.try_insert(hash_u64(42), 42u64, "x", |&k| k == 42).unwrap();
    ///
    /// assert_eq!(table.find(hash_u64(42), |&k| k == 42), Some((&42, &"x")));
    /// assert_eq!(table.find(hash_u64(99), |&k| k == 99), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &V)> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns occupied slots.
        unsafe {
            Some((
                self.slots.keys()[index].assume_init_ref(),
                self.slots.values()[index].assume_init_ref(),
            ))
        }
    }

    /// Finds a value in the table by hash and equality predicate, returning a
    /// mutable reference to the value.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &mut V)> {
        let index = self.find_index(hash, eq)?;
        let SlotsMut { keys, values, .. } = self.slots.parts_mut();
        // SAFETY: `find_index` only returns occupied slots.
        unsafe {
            Some((
                keys[index].assume_init_ref(),
                values[index].assume_init_mut(),
            ))
        }
    }

    /// Displacement recorded at a non-empty slot. A tombstone reports the
    /// displacement of the entry removed from it, recovered from its hash.
    #[inline(always)]
    fn recorded_displacement(&self, index: usize) -> Option<u8> {
        match self.slots.meta()[index].state() {
            SlotState::Empty => None,
            SlotState::Occupied(displacement) => Some(displacement),
            SlotState::Tombstone => {
                // SAFETY: tombstones keep the hash of the entry they replaced.
                let hash = unsafe { self.slots.hashes()[index].assume_init_read() };
                Some(displacement_of(index, hash, self.mask()))
            }
        }
    }

    /// Lookup probe. Stops at a never-occupied slot, or at a slot whose
    /// recorded displacement is smaller than the distance travelled: Robin
    /// Hood placement would have put the key before it.
    fn find_index(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<usize> {
        if self.len == 0 {
            return None;
        }

        let meta = self.slots.meta();
        let hashes = self.slots.hashes();
        let keys = self.slots.keys();
        let mask = self.mask();
        let mut index = hash as usize & mask;

        for distance in 0..self.probe_limit() {
            let recorded = self.recorded_displacement(index)?;
            if (recorded as usize) < distance {
                return None;
            }
            if meta[index].is_occupied() {
                // SAFETY: occupied slots hold an initialized hash and key.
                let stored = unsafe { hashes[index].assume_init_read() };
                if stored == hash && eq(unsafe { keys[index].assume_init_ref() }) {
                    return Some(index);
                }
            }
            index = (index + 1) & mask;
        }

        None
    }

    /// Insertion probe. Walks the same sequence as a lookup until the key is
    /// found or proven absent.
    ///
    /// A tombstone is treated as a resident whose key never matches. The entry
    /// goes into the first tombstone that recorded exactly its own distance,
    /// or else where the probe stops. Putting it into any other tombstone
    /// would lower that slot's recorded displacement and cut entries further
    /// along off from lookups.
    ///
    /// When the new entry has to evict a resident, the whole eviction chain is
    /// checked against the displacement bound here so that writing the entry
    /// afterwards cannot fail.
    fn probe_for_insert(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Result<Probe, Error> {
        let meta = self.slots.meta();
        let hashes = self.slots.hashes();
        let keys = self.slots.keys();
        let mask = self.mask();
        let mut index = hash as usize & mask;
        let mut displacement = 0u8;
        let mut reusable: Option<(usize, u8)> = None;

        for _ in 0..self.probe_limit() {
            match meta[index].state() {
                SlotState::Empty => return Ok(Probe::vacant(reusable, index, displacement)),
                SlotState::Tombstone => match self.recorded_displacement(index) {
                    Some(recorded) if recorded < displacement => {
                        return Ok(Probe::vacant(reusable, index, displacement));
                    }
                    Some(recorded) if recorded == displacement => {
                        reusable.get_or_insert((index, displacement));
                    }
                    _ => {}
                },
                SlotState::Occupied(resident) if resident < displacement => {
                    if reusable.is_none() {
                        self.check_eviction_chain(index, resident)?;
                    }
                    return Ok(Probe::vacant(reusable, index, displacement));
                }
                SlotState::Occupied(_) => {
                    // SAFETY: occupied slots hold an initialized hash and key.
                    let stored = unsafe { hashes[index].assume_init_read() };
                    if stored == hash && eq(unsafe { keys[index].assume_init_ref() }) {
                        return Ok(Probe::Found(index));
                    }
                }
            }
            index = (index + 1) & mask;
            displacement += 1;
        }

        reusable
            .map(|(index, displacement)| Probe::vacant(None, index, displacement))
            .ok_or(Error::CapacityExhausted)
    }

    /// Replays the evictions that writing an entry at `start` would cause,
    /// without writing, and fails if any carried entry would overflow the
    /// displacement range. `resident` is the displacement of the entry
    /// currently at `start`.
    fn check_eviction_chain(&self, start: usize, resident: u8) -> Result<(), Error> {
        let meta = self.slots.meta();
        let mask = self.mask();
        let mut index = start;
        let mut carried = resident;

        for _ in 1..self.slots.capacity {
            index = (index + 1) & mask;
            carried = next_displacement(carried)?;
            match meta[index].state() {
                SlotState::Empty => return Ok(()),
                SlotState::Tombstone => match self.recorded_displacement(index) {
                    Some(recorded) if recorded <= carried => return Ok(()),
                    _ => {}
                },
                SlotState::Occupied(resident) if resident < carried => carried = resident,
                SlotState::Occupied(_) => {}
            }
        }

        Err(Error::CapacityExhausted)
    }

    /// Writes a new entry at `index`, carrying evicted residents forward
    /// until one lands in an empty slot or in a tombstone that recorded at
    /// most its distance.
    ///
    /// The probe that produced `index` has already validated the chain.
    fn place(&mut self, mut index: usize, mut displacement: u8, mut hash: u64, mut key: K, mut value: V) {
        let mask = self.mask();
        let slots = self.slots.parts_mut();

        loop {
            let state = slots.meta[index].state();
            let lands = match state {
                SlotState::Empty => true,
                SlotState::Tombstone => {
                    // SAFETY: tombstones keep the hash of the entry they replaced.
                    let removed = unsafe { slots.hashes[index].assume_init_read() };
                    displacement_of(index, removed, mask) <= displacement
                }
                SlotState::Occupied(_) => false,
            };

            if lands {
                if state == SlotState::Tombstone {
                    self.tombstones -= 1;
                }
                slots.meta[index] = Meta::occupied(displacement);
                slots.hashes[index] = MaybeUninit::new(hash);
                slots.keys[index] = MaybeUninit::new(key);
                slots.values[index] = MaybeUninit::new(value);
                self.len += 1;
                return;
            }

            match state {
                SlotState::Occupied(resident) if resident < displacement => {
                    slots.meta[index] = Meta::occupied(displacement);
                    displacement = resident;
                    // SAFETY: occupied slots hold an initialized hash, key and value;
                    // each is swapped for the carried one, never duplicated.
                    unsafe {
                        hash = core::mem::replace(&mut slots.hashes[index], MaybeUninit::new(hash))
                            .assume_init();
                        key = core::mem::replace(&mut slots.keys[index], MaybeUninit::new(key))
                            .assume_init();
                        value =
                            core::mem::replace(&mut slots.values[index], MaybeUninit::new(value))
                                .assume_init();
                    }
                }
                _ => {}
            }
            index = (index + 1) & mask;
            displacement += 1;
        }
    }

    /// Turns the occupied slot at `index` into a tombstone and moves its
    /// entry out.
    fn take(&mut self, index: usize) -> (K, V) {
        let slots = self.slots.parts_mut();
        debug_assert!(slots.meta[index].is_occupied());

        slots.meta[index] = Meta::TOMBSTONE;
        self.len -= 1;
        self.tombstones += 1;

        // SAFETY: the slot was occupied, and its tombstone metadata keeps the
        // moved-out key and value from being read or dropped again. The hash
        // stays behind as the tombstone's record.
        unsafe {
            (
                slots.keys[index].assume_init_read(),
                slots.values[index].assume_init_read(),
            )
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// The grow check runs first, so the table may be resized even when the
    /// key turns out to be present. Every fallible step happens here: a
    /// returned [`VacantEntry`] can always be filled.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hood_map::hash_table::Entry;
    /// # use robin_hood_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: HashTable<String, u32> = HashTable::with_capacity(10);
    /// let hash = hash_str("hello");
    ///
    /// match table.try_entry(hash, |k| k == "hello").unwrap() {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert("hello".to_string(), 1);
    ///     }
    ///     Entry::Occupied(mut entry) => {
    ///         *entry.get_mut() += 1;
    ///     }
    /// }
    ///
    /// assert_eq!(table.find(hash, |k| k == "hello").map(|(_, v)| *v), Some(1));
    /// ```
    pub fn try_entry(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Result<Entry<'_, K, V>, Error> {
        self.maybe_grow()?;

        Ok(match self.probe_for_insert(hash, eq)? {
            Probe::Found(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            Probe::Vacant {
                index,
                displacement,
            } => Entry::Vacant(VacantEntry {
                table: self,
                hash,
                index,
                displacement,
            }),
        })
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// # Panics
    ///
    /// Panics or aborts on the conditions [`try_entry`](Self::try_entry)
    /// reports as errors.
    #[inline]
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Entry<'_, K, V> {
        match self.try_entry(hash, eq) {
            Ok(entry) => entry,
            Err(err) => err.raise(),
        }
    }

    /// Inserts `key` and `value`, or replaces the value stored for a key
    /// matching `eq`.
    ///
    /// Returns the replaced value on update. On update the passed key is
    /// dropped and the stored key kept.
    ///
    /// # Errors
    ///
    /// Fails with an allocation error if a required grow cannot allocate, or
    /// with [`Error::CapacityExhausted`] if the entry cannot be placed within
    /// the displacement bound. The table is unchanged on error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(0);
    /// assert_eq!(table.try_insert(7, 7u32, "a", |&k| k == 7), Ok(None));
    /// assert_eq!(table.try_insert(7, 7u32, "b", |&k| k == 7), Ok(Some("a")));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn try_insert(
        &mut self,
        hash: u64,
        key: K,
        value: V,
        eq: impl Fn(&K) -> bool,
    ) -> Result<Option<V>, Error> {
        match self.try_entry(hash, eq)? {
            Entry::Occupied(mut entry) => Ok(Some(entry.insert(value))),
            Entry::Vacant(entry) => {
                entry.insert(key, value);
                Ok(None)
            }
        }
    }

    /// Removes the entry whose key matches `eq` and returns it.
    ///
    /// The shrink check runs first: when live entries fit in a quarter of the
    /// slots the table halves before probing. Removing an absent key succeeds
    /// with `None`.
    ///
    /// # Errors
    ///
    /// Fails only if the shrink cannot be performed; the table is unchanged
    /// and the entry not removed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hood_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.try_insert(hash_u64(42), 42u64, 420, |&k| k == 42).unwrap();
    ///
    /// assert_eq!(table.try_remove(hash_u64(42), |&k| k == 42), Ok(Some((42, 420))));
    /// assert!(table.is_empty());
    ///
    /// // Removing a missing key is not an error.
    /// assert_eq!(table.try_remove(hash_u64(42), |&k| k == 42), Ok(None));
    /// ```
    pub fn try_remove(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Result<Option<(K, V)>, Error> {
        self.maybe_shrink()?;
        Ok(self.find_index(hash, eq).map(|index| self.take(index)))
    }

    /// Removes the entry whose key matches `eq` and returns it.
    ///
    /// Unlike [`try_remove`](Self::try_remove) this never fails: when the
    /// shrink cannot be performed the entry is removed from the current
    /// storage.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        // A shrink is an optimization for removals; keep the current storage
        // if it cannot happen.
        let _ = self.maybe_shrink();
        self.find_index(hash, eq).map(|index| self.take(index))
    }

    #[inline]
    fn maybe_grow(&mut self) -> Result<(), Error> {
        if sizing::needs_grow(self.len, self.tombstones, self.capacity()) {
            self.grow()
        } else {
            Ok(())
        }
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self) -> Result<(), Error> {
        // Tombstones do not survive the resize, so only live entries count
        // against the new capacity.
        let mut capacity = self.capacity();
        loop {
            capacity = capacity.checked_mul(2).ok_or(Error::CapacityOverflow)?;
            if !sizing::needs_grow(self.len, 0, capacity) {
                break;
            }
        }

        self.resize(capacity)
    }

    #[inline]
    fn maybe_shrink(&mut self) -> Result<(), Error> {
        if sizing::needs_shrink(self.len, self.capacity()) {
            self.resize(self.capacity() / 2)
        } else {
            Ok(())
        }
    }

    /// Rebuilds the table with `capacity` slots.
    ///
    /// Every live entry is re-placed with the Robin Hood rule using its cached
    /// hash, visiting old slots in index order. Tombstones are dropped. On
    /// error the current storage is untouched.
    fn resize(&mut self, capacity: usize) -> Result<(), Error> {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(capacity >= sizing::MIN_CAPACITY);

        let mut fresh = Slots::<K, V>::try_allocate(capacity)?;
        if let Err(err) = plan_relocation(&self.slots, &mut fresh) {
            fresh.mark_all_empty();
            return Err(err);
        }

        {
            let old_hashes = self.slots.hashes();
            let old_keys = self.slots.keys();
            let old_values = self.slots.values();
            let new = fresh.parts_mut();

            for index in 0..capacity {
                if !new.meta[index].is_occupied() {
                    continue;
                }

                // SAFETY: planning stored the index of an occupied old slot in the
                // hash array. Each old slot is planned exactly once, and the old
                // storage forgets its entries below, so every key and value is
                // moved exactly once.
                unsafe {
                    let source = new.hashes[index].assume_init_read() as usize;
                    new.hashes[index] = old_hashes[source];
                    new.keys[index] = MaybeUninit::new(old_keys[source].assume_init_read());
                    new.values[index] = MaybeUninit::new(old_values[source].assume_init_read());
                }
            }
        }

        let mut old = core::mem::replace(&mut self.slots, fresh);
        old.mark_all_empty();
        drop(old);
        self.tombstones = 0;

        Ok(())
    }

    /// Reserves room for at least `additional` more insertions without a
    /// resize.
    ///
    /// Tombstones count against the room, so this may rehash at the current
    /// capacity to reclaim them.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64, u64> = HashTable::with_capacity(1);
    /// table.try_reserve(100).unwrap();
    /// assert!(table.capacity() >= 128);
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        if required.saturating_add(self.tombstones) <= sizing::grow_limit(self.capacity()) {
            return Ok(());
        }

        let capacity = sizing::capacity_to_hold(required)?.max(self.capacity());
        self.resize(capacity)
    }

    /// Reserves room for at least `additional` more insertions.
    ///
    /// # Panics
    ///
    /// Panics or aborts on the conditions [`try_reserve`](Self::try_reserve)
    /// reports as errors.
    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            err.raise();
        }
    }

    /// Shrinks the table to the smallest power-of-two slot count whose grow
    /// limit still holds every live entry.
    pub fn try_shrink_to_fit(&mut self) -> Result<(), Error> {
        let capacity = sizing::capacity_to_hold(self.len)?;
        if capacity < self.capacity() {
            self.resize(capacity)?;
        }
        Ok(())
    }

    /// Shrinks the table as much as possible, keeping the current storage if
    /// the smaller one cannot be built.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64, u64> = HashTable::with_capacity(1000);
    /// table.try_insert(1, 1, 1, |&k| k == 1).unwrap();
    /// table.try_insert(2, 2, 2, |&k| k == 2).unwrap();
    ///
    /// table.shrink_to_fit();
    /// assert!(table.capacity() < 1000);
    /// assert_eq!(table.len(), 2);
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let _ = self.try_shrink_to_fit();
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        drop(self.drain());
    }

    /// Returns an iterator over all entries in slot order.
    ///
    /// The order is not meaningful and changes whenever the table resizes.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            table: self,
            index: 0,
            remaining: self.len,
        }
    }

    /// Returns an iterator that removes and yields all entries.
    ///
    /// The table is empty, with no tombstones, once the iterator is dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.try_insert(1, 1u8, 'a', |&k| k == 1).unwrap();
    /// table.try_insert(2, 2u8, 'b', |&k| k == 2).unwrap();
    ///
    /// let mut drained: Vec<_> = table.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, vec![(1, 'a'), (2, 'b')]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Empties slots from `*cursor` onwards until it finds an entry to move
    /// out.
    fn take_next(&mut self, cursor: &mut usize) -> Option<(K, V)> {
        while *cursor < self.slots.capacity {
            let index = *cursor;
            *cursor += 1;

            let slots = self.slots.parts_mut();
            match slots.meta[index].state() {
                SlotState::Empty => {}
                SlotState::Tombstone => {
                    slots.meta[index] = Meta::EMPTY;
                    self.tombstones -= 1;
                }
                SlotState::Occupied(_) => {
                    slots.meta[index] = Meta::EMPTY;
                    self.len -= 1;
                    // SAFETY: the slot was occupied and is now empty, so the key and
                    // value are moved out exactly once.
                    return Some(unsafe {
                        (
                            slots.keys[index].assume_init_read(),
                            slots.values[index].assume_init_read(),
                        )
                    });
                }
            }
        }

        None
    }

    /// Computes a histogram of displacements over live entries: index `d`
    /// counts entries stored `d` slots past their ideal slot.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> alloc::vec::Vec<usize> {
        let mut hist = alloc::vec::Vec::new();
        for meta in self.slots.meta() {
            if let SlotState::Occupied(displacement) = meta.state() {
                let displacement = displacement as usize;
                if hist.len() <= displacement {
                    hist.resize(displacement + 1, 0);
                }
                hist[displacement] += 1;
            }
        }
        hist
    }

    /// Returns utilization and displacement statistics for debugging.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let hist = self.probe_histogram();
        let total: usize = hist.iter().enumerate().map(|(d, count)| d * count).sum();

        DebugStats {
            len: self.len,
            tombstones: self.tombstones,
            capacity: self.capacity(),
            load_factor: (self.len + self.tombstones) as f64 / self.capacity() as f64,
            max_displacement: hist.len().saturating_sub(1),
            mean_displacement: if self.len == 0 {
                0.0
            } else {
                total as f64 / self.len as f64
            },
            total_bytes: self.slots.layout.layout.size(),
        }
    }

    /// Pretty-prints the displacement histogram as a horizontal bar chart.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_probe_histogram(&self) {
        let hist = self.probe_histogram();
        let max = hist.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        println!("probe histogram ({} entries):", self.len);
        for (displacement, &count) in hist.iter().enumerate() {
            let width = (count * max_bar).div_ceil(max);
            println!("{displacement:>3} | {} ({count})", "█".repeat(width));
        }
    }

    /// Checks every structural invariant of the table.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let capacity = self.capacity();
        assert!(capacity.is_power_of_two());
        assert!(capacity >= sizing::MIN_CAPACITY);

        let meta = self.slots.meta();
        let hashes = self.slots.hashes();
        let mut live = 0;
        let mut tombstones = 0;

        for index in 0..capacity {
            match meta[index].state() {
                SlotState::Empty => {}
                SlotState::Tombstone => tombstones += 1,
                SlotState::Occupied(displacement) => {
                    live += 1;
                    // SAFETY: occupied slots hold an initialized hash.
                    let hash = unsafe { hashes[index].assume_init_read() };
                    let ideal = hash as usize & self.mask();
                    assert_eq!(
                        displacement as usize,
                        index.wrapping_sub(ideal) & self.mask(),
                        "slot {index} records the wrong displacement"
                    );
                }
            }

            // Along a run, recorded displacements grow by at most one per slot,
            // tombstones included; lookups rely on this to stop early.
            let next = (index + 1) & self.mask();
            if let (Some(recorded), Some(following)) = (
                self.recorded_displacement(index),
                self.recorded_displacement(next),
            ) {
                assert!(
                    following <= recorded + 1,
                    "slot {next} jumps from {recorded} to {following}"
                );
            }
        }

        assert_eq!(live, self.len);
        assert_eq!(tombstones, self.tombstones);
        assert!(self.len + self.tombstones <= sizing::grow_limit(capacity));
    }
}

/// A view into a single entry in the hash table, which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
///
/// # Examples
///
/// ```rust
/// # use robin_hood_map::hash_table::Entry;
/// # use robin_hood_map::hash_table::HashTable;
/// #
/// let mut table: HashTable<u64, &str> = HashTable::with_capacity(10);
///
/// match table.entry(5, |&k| k == 5) {
///     Entry::Vacant(entry) => {
///         entry.insert(5, "five");
///     }
///     Entry::Occupied(entry) => {
///         println!("Key already exists with value: {}", entry.get());
///     }
/// }
/// ```
pub enum Entry<'a, K, V> {
    /// The key is not present in the table.
    Vacant(VacantEntry<'a, K, V>),
    /// The key is present in the table.
    Occupied(OccupiedEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Inserts `key` and `default` if the entry is vacant and returns a
    /// mutable reference to the value.
    ///
    /// If the entry is occupied, `key` and `default` are dropped and the
    /// existing value is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hood_map::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64, u32> = HashTable::with_capacity(10);
    ///
    /// *table.entry(3, |&k| k == 3).or_insert(3, 0) += 1;
    /// *table.entry(3, |&k| k == 3).or_insert(3, 0) += 1;
    /// assert_eq!(table.find(3, |&k| k == 3), Some((&3, &2)));
    /// ```
    pub fn or_insert(self, key: K, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(key, default),
        }
    }

    /// Inserts `key` and the value computed by `default` if the entry is
    /// vacant. The closure is not called for an occupied entry.
    pub fn or_insert_with(self, key: K, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(key, default()),
        }
    }

    /// Modifies the value of an occupied entry in place and returns it, or
    /// returns `None` for a vacant entry.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `key` with the default value if the entry is vacant.
    pub fn or_default(self, key: K) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(key, Default::default)
    }
}

/// A view into a vacant entry in the hash table.
///
/// The slot and displacement were fixed by the probe that created the entry;
/// inserting cannot fail.
pub struct VacantEntry<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    hash: u64,
    index: usize,
    displacement: u8,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Returns the hash the entry will be stored under.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Inserts the key and value and returns a mutable reference to the
    /// value.
    pub fn insert(self, key: K, value: V) -> &'a mut V {
        let VacantEntry {
            table,
            hash,
            index,
            displacement,
        } = self;

        table.place(index, displacement, hash, key, value);
        // SAFETY: `place` always leaves the new entry at the probed slot; only
        // evicted residents move further.
        unsafe { table.slots.values_mut()[index].assume_init_mut() }
    }
}

/// A view into an occupied entry in the hash table.
pub struct OccupiedEntry<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    index: usize,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    /// Gets a reference to the stored key.
    pub fn key(&self) -> &K {
        // SAFETY: the entry points at an occupied slot.
        unsafe { self.table.slots.keys()[self.index].assume_init_ref() }
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: the entry points at an occupied slot.
        unsafe { self.table.slots.values()[self.index].assume_init_ref() }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: the entry points at an occupied slot.
        unsafe { self.table.slots.values_mut()[self.index].assume_init_mut() }
    }

    /// Converts the entry into a mutable reference to the value with the
    /// lifetime of the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        let OccupiedEntry { table, index } = self;
        // SAFETY: the entry points at an occupied slot.
        unsafe { table.slots.values_mut()[index].assume_init_mut() }
    }

    /// Replaces the value in the entry and returns the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, leaving a tombstone, and returns the key and value.
    ///
    /// No shrink check runs for entry removals.
    pub fn remove(self) -> (K, V) {
        self.table.take(self.index)
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// This struct is created by the [`iter`] method on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, K, V> {
    table: &'a HashTable<K, V>,
    index: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.table;
        let meta = table.slots.meta();

        while self.remaining > 0 && self.index < meta.len() {
            let index = self.index;
            self.index += 1;

            if meta[index].is_occupied() {
                self.remaining -= 1;
                // SAFETY: occupied slots hold an initialized key and value.
                return Some(unsafe {
                    (
                        table.slots.keys()[index].assume_init_ref(),
                        table.slots.values()[index].assume_init_ref(),
                    )
                });
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`].
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    index: usize,
}

impl<K, V> Drop for Drain<'_, K, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.table.take_next(&mut self.index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len, Some(self.table.len))
    }
}

/// An owning iterator over the entries of a [`HashTable`].
pub struct IntoIter<K, V> {
    table: HashTable<K, V>,
    index: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.table.take_next(&mut self.index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len, Some(self.table.len))
    }
}

impl<K, V> IntoIterator for HashTable<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            table: self,
            index: 0,
        }
    }
}

impl<'a, K, V> IntoIterator for &'a HashTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    /// Cheap shift-xor integer mixer for the scenario tests.
    fn inthash(i: u64) -> u64 {
        let mut hash = i;
        hash ^= hash >> 15;
        hash ^= hash >> 7;
        hash ^= hash >> 3;
        hash ^= hash << 5;
        hash ^= hash >> 16;
        hash
    }

    fn insert(table: &mut HashTable<u64, i64>, hash: u64, key: u64, value: i64) -> Option<i64> {
        table.try_insert(hash, key, value, |&k| k == key).unwrap()
    }

    fn get(table: &HashTable<u64, i64>, hash: u64, key: u64) -> Option<i64> {
        table.find(hash, |&k| k == key).map(|(_, v)| *v)
    }

    fn unset(table: &mut HashTable<u64, i64>, hash: u64, key: u64) -> Option<i64> {
        table
            .try_remove(hash, |&k| k == key)
            .unwrap()
            .map(|(_, v)| v)
    }

    #[test]
    fn new_rounds_capacity() {
        let table: HashTable<u64, i64> = HashTable::with_capacity(0);
        assert_eq!(table.capacity(), sizing::DEFAULT_CAPACITY);
        let table: HashTable<u64, i64> = HashTable::with_capacity(1);
        assert_eq!(table.capacity(), 1);
        let table: HashTable<u64, i64> = HashTable::with_capacity(33);
        assert_eq!(table.capacity(), 64);
        table.assert_invariants();
    }

    #[test]
    fn new_reports_overflow() {
        assert_eq!(
            HashTable::<u64, i64>::try_with_capacity(usize::MAX).unwrap_err(),
            Error::CapacityOverflow
        );
        // Power of two that fits in usize but not in a layout.
        assert_eq!(
            HashTable::<u64, [u8; 64]>::try_with_capacity(1 << (usize::BITS - 2)).unwrap_err(),
            Error::CapacityOverflow
        );
    }

    #[test]
    fn scenario_default_capacity() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(0);
        assert_eq!(table.capacity(), 32);

        let pairs = [(1u64, 0i64), (2, 1), (4, 2), (8, 3), (16, 4)];
        for (key, value) in pairs {
            assert_eq!(insert(&mut table, inthash(key), key, value), None);
            table.assert_invariants();
        }
        for (key, value) in pairs {
            assert_eq!(get(&table, inthash(key), key), Some(value));
        }
        for (key, value) in pairs {
            assert_eq!(unset(&mut table, inthash(key), key), Some(value));
            table.assert_invariants();
        }
        for (key, _) in pairs {
            assert_eq!(get(&table, inthash(key), key), None);
        }
        assert!(table.is_empty());
        assert!(table.capacity() < 32);
    }

    #[test]
    fn scenario_minimal_capacity() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(1);
        assert_eq!(table.capacity(), 1);

        insert(&mut table, inthash(16), 16, 4);
        assert!(table.capacity() > 1);
        table.assert_invariants();
        assert_eq!(get(&table, inthash(16), 16), Some(4));

        assert_eq!(unset(&mut table, inthash(16), 16), Some(4));
        assert_eq!(get(&table, inthash(16), 16), None);
        table.assert_invariants();
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(0);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(insert(&mut table, hash, k, k as i64 * 2), None);
            assert_eq!(get(&table, hash, k), Some(k as i64 * 2), "{:#?}", table);
        }
        assert_eq!(table.len(), 32);
        table.assert_invariants();

        for k in 0..32u64 {
            assert_eq!(get(&table, hash_key(&state, k), k), Some(k as i64 * 2));
        }
        assert_eq!(get(&table, hash_key(&state, 999), 999), None);
    }

    #[test]
    fn overwrite_keeps_len() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(0);
        assert_eq!(insert(&mut table, inthash(5), 5, 1), None);
        assert_eq!(insert(&mut table, inthash(5), 5, 2), Some(1));
        assert_eq!(table.len(), 1);
        assert_eq!(get(&table, inthash(5), 5), Some(2));
    }

    #[test]
    fn delete_then_lookup() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(64);
        for k in 0..20u64 {
            insert(&mut table, inthash(k), k, k as i64);
        }

        assert_eq!(unset(&mut table, inthash(7), 7), Some(7));
        assert_eq!(table.len(), 19);
        assert_eq!(get(&table, inthash(7), 7), None);
        assert_eq!(unset(&mut table, inthash(7), 7), None);
        assert_eq!(table.len(), 19);
        table.assert_invariants();
    }

    #[test]
    fn colliding_hashes_evict_and_terminate_early() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(64);
        // Ten keys sharing ideal slot 3, then keys whose ideal slots sit inside
        // that run and must be pushed past it.
        for k in 0..10u64 {
            insert(&mut table, 3, k, k as i64);
        }
        for k in 10..14u64 {
            insert(&mut table, 4 + (k - 10), k, k as i64);
        }
        table.assert_invariants();

        for k in 0..10u64 {
            assert_eq!(get(&table, 3, k), Some(k as i64));
        }
        for k in 10..14u64 {
            assert_eq!(get(&table, 4 + (k - 10), k), Some(k as i64));
        }
        assert_eq!(get(&table, 3, 100), None);
        assert_eq!(get(&table, 20, 100), None);
    }

    #[test]
    fn equal_displacement_does_not_swap() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(16);
        insert(&mut table, 0, 1, 1);
        insert(&mut table, 1, 2, 2);
        // Ideal slot 0, reaches slot 1 with displacement 1 while the resident
        // there has displacement 0: evicts it.
        insert(&mut table, 0, 3, 3);

        let order: Vec<u64> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![1, 3, 2]);

        // Ideal slot 1 meets the displacement-1 resident at slot 1 with
        // displacement 0, then the displacement-1 resident at slot 2 with an
        // equal displacement: no swap, lands in slot 3.
        insert(&mut table, 1, 4, 4);
        let order: Vec<u64> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![1, 3, 2, 4]);
        table.assert_invariants();
    }

    #[test]
    fn tombstone_is_reused_without_duplicating() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(16);
        insert(&mut table, 0, 1, 10);
        insert(&mut table, 0, 2, 20);
        insert(&mut table, 0, 3, 30);

        assert!(table.remove(0, |&k| k == 1).is_some());
        assert_eq!(table.tombstones(), 1);

        // Key 2 lives past the tombstone: it must be updated, not duplicated.
        assert_eq!(insert(&mut table, 0, 2, 21), Some(20));
        assert_eq!(table.len(), 2);
        assert_eq!(table.tombstones(), 1);

        // A fresh key takes the tombstone.
        assert_eq!(insert(&mut table, 0, 4, 40), None);
        assert_eq!(table.len(), 3);
        assert_eq!(table.tombstones(), 0);
        table.assert_invariants();

        assert_eq!(get(&table, 0, 2), Some(21));
        assert_eq!(get(&table, 0, 3), Some(30));
        assert_eq!(get(&table, 0, 4), Some(40));
    }

    #[test]
    fn tombstone_keeps_its_displacement() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(16);
        // Slots 0..3 hold keys 1, 2, 3 (ideal slot 0) and key 4 (ideal slot 2).
        insert(&mut table, 0, 1, 10);
        insert(&mut table, 0, 2, 20);
        insert(&mut table, 0, 3, 30);
        insert(&mut table, 2, 4, 40);

        // Slot 1 becomes a tombstone that recorded displacement 1. Removing
        // through an entry skips the shrink check.
        match table.entry(0, |&k| k == 2) {
            Entry::Occupied(entry) => {
                entry.remove();
            }
            Entry::Vacant(_) => unreachable!(),
        }

        // Ideal slot 1: taking the tombstone at displacement 0 would hide key 3,
        // which passed slot 1 at distance 1.
        assert_eq!(insert(&mut table, 1, 5, 50), None);
        assert_eq!(table.tombstones(), 1);
        table.assert_invariants();

        assert_eq!(get(&table, 0, 3), Some(30));
        assert_eq!(get(&table, 2, 4), Some(40));
        assert_eq!(get(&table, 1, 5), Some(50));

        // A key whose probe records displacement 1 at slot 1 may take it.
        assert_eq!(insert(&mut table, 0, 6, 60), None);
        assert_eq!(table.tombstones(), 0);
        table.assert_invariants();
        assert_eq!(get(&table, 0, 3), Some(30));
        assert_eq!(get(&table, 0, 6), Some(60));
    }

    #[test]
    fn displacement_overflow_is_reported() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(1024);
        for k in 0..=MAX_DISPLACEMENT as u64 {
            insert(&mut table, 0, k, k as i64);
        }
        assert_eq!(table.len(), MAX_DISPLACEMENT as usize + 1);
        table.assert_invariants();

        let before = table.len();
        assert_eq!(
            table.try_insert(0, 9999, 0, |&k| k == 9999),
            Err(Error::CapacityExhausted)
        );
        assert_eq!(table.len(), before);
        table.assert_invariants();

        // Existing keys remain reachable and updatable.
        assert_eq!(insert(&mut table, 0, 17, -17), Some(17));
    }

    #[test]
    fn eviction_chain_overflow_leaves_table_untouched() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(1024);
        // A full-length run starting at slot 1, plus a resident in slot 0.
        for k in 0..=MAX_DISPLACEMENT as u64 {
            insert(&mut table, 1, k, k as i64);
        }
        insert(&mut table, 0, 5000, 5000);
        let snapshot: Vec<(u64, i64)> = table.iter().map(|(k, v)| (*k, *v)).collect();

        // Ideal slot 0 reaches slot 1 with displacement 1 and would evict the
        // run's head, pushing its tail past the bound.
        assert_eq!(
            table.try_insert(0, 5001, 5001, |&k| k == 5001),
            Err(Error::CapacityExhausted)
        );
        let after: Vec<(u64, i64)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(snapshot, after);
        table.assert_invariants();
    }

    #[test]
    fn grow_preserves_contents() {
        let state = HashState::default();
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(1);
        let mut capacity = table.capacity();
        for k in 0..5000u64 {
            insert(&mut table, hash_key(&state, k), k, k as i64);
            if table.capacity() != capacity {
                assert_eq!(table.capacity(), capacity * 2);
                capacity = table.capacity();
                table.assert_invariants();
                for j in 0..=k {
                    assert_eq!(get(&table, hash_key(&state, j), j), Some(j as i64));
                }
            }
        }
        table.assert_invariants();
    }

    #[test]
    fn shrink_preserves_contents() {
        let state = HashState::default();
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(0);
        for k in 0..4096u64 {
            insert(&mut table, hash_key(&state, k), k, k as i64);
        }

        let mut capacity = table.capacity();
        for k in 0..4096u64 {
            unset(&mut table, hash_key(&state, k), k);
            if table.capacity() != capacity {
                // The shrink runs before the removal, so only the removed key's
                // tombstone is left.
                assert_eq!(table.capacity(), capacity / 2);
                assert_eq!(table.tombstones(), 1);
                assert_eq!(get(&table, hash_key(&state, k), k), None);
                capacity = table.capacity();
                table.assert_invariants();
                for j in k + 1..4096 {
                    assert_eq!(get(&table, hash_key(&state, j), j), Some(j as i64));
                }
            }
        }

        assert!(table.is_empty());
        assert!(table.capacity() <= 2);
    }

    #[test]
    fn failed_shrink_keeps_storage() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(2048);
        // Two runs of 150 at slots 0 and 1024. Halving merges them into one run
        // of 300, past the displacement bound.
        for k in 0..300u64 {
            insert(&mut table, k * 1024, k, k as i64);
        }
        table.assert_invariants();

        assert_eq!(
            table.try_remove(0, |&k| k == 0),
            Err(Error::CapacityExhausted)
        );
        assert_eq!(table.capacity(), 2048);
        assert_eq!(table.len(), 300);
        assert_eq!(table.tombstones(), 0);
        table.assert_invariants();
        for k in 0..300u64 {
            assert_eq!(get(&table, k * 1024, k), Some(k as i64));
        }

        // The infallible removal falls back to the current storage.
        assert_eq!(table.remove(0, |&k| k == 0), Some((0, 0)));
        assert_eq!(table.capacity(), 2048);
        assert_eq!(table.len(), 299);
        table.assert_invariants();
        assert_eq!(get(&table, 0, 0), None);
        for k in 1..300u64 {
            assert_eq!(get(&table, k * 1024, k), Some(k as i64));
        }
    }

    #[test]
    fn tombstones_trigger_growth() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(16);
        let limit = sizing::grow_limit(16) as u64;
        // One key per ideal slot, so later keys never probe across tombstones.
        for k in 0..limit - 1 {
            insert(&mut table, k, k, 0);
        }
        // Removing through an entry skips the shrink check and leaves tombstones.
        for k in 0..4u64 {
            match table.entry(k, |&x| x == k) {
                Entry::Occupied(entry) => {
                    entry.remove();
                }
                Entry::Vacant(_) => unreachable!(),
            }
        }
        assert_eq!(table.tombstones(), 4);

        insert(&mut table, limit, 100, 0);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.tombstones(), 4);

        // Live entries alone are well under the limit; tombstones force the grow.
        insert(&mut table, limit + 1, 101, 0);
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.tombstones(), 0);
        table.assert_invariants();
    }

    #[test]
    fn random_operations_keep_invariants() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(0);
        let mut model: Vec<Option<i64>> = vec![None; 512];

        for step in 0..20_000 {
            let key = rng.random_range(0..512u64);
            let hash = inthash(key);
            if rng.random_bool(0.6) {
                let value = step as i64;
                let previous = insert(&mut table, hash, key, value);
                assert_eq!(previous, model[key as usize].replace(value));
            } else {
                let removed = unset(&mut table, hash, key);
                assert_eq!(removed, model[key as usize].take());
            }

            if step % 97 == 0 {
                table.assert_invariants();
            }
        }

        table.assert_invariants();
        for (key, value) in model.iter().enumerate() {
            assert_eq!(get(&table, inthash(key as u64), key as u64), *value);
        }
        assert_eq!(table.len(), model.iter().filter(|v| v.is_some()).count());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn stress_insert_then_remove_all() {
        stress(1 << 18);
    }

    #[test]
    #[ignore = "full-size stress run, several minutes in debug builds"]
    fn stress_full_size() {
        stress(1 << 24);
    }

    fn stress(count: usize) {
        let mut rng = SmallRng::seed_from_u64(0xdead_beef);
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
        let mut keys = Vec::with_capacity(count);

        for _ in 0..count {
            let key: u64 = rng.random();
            let value: u64 = rng.random();
            let hash = inthash(key);
            table.try_insert(hash, key, value, |&k| k == key).unwrap();
            assert_eq!(table.find(hash, |&k| k == key), Some((&key, &value)));
            keys.push(key);
        }

        for key in keys {
            let hash = inthash(key);
            table.try_remove(hash, |&k| k == key).unwrap();
            assert!(table.find(hash, |&k| k == key).is_none());
        }

        assert_eq!(table.len(), 0);
        assert!(table.capacity() <= 2);
    }

    #[derive(Clone)]
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn values_are_dropped_exactly_once() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut table: HashTable<u64, DropCounter> = HashTable::with_capacity(1);
            for k in 0..100u64 {
                let value = DropCounter {
                    drops: drops.clone(),
                };
                table.try_insert(inthash(k), k, value, |&x| x == k).unwrap();
            }
            // Growth moved every value several times without dropping any.
            assert_eq!(drops.get(), 0);

            // Overwrite drops the old value.
            let value = DropCounter {
                drops: drops.clone(),
            };
            table.try_insert(inthash(0), 0, value, |&x| x == 0).unwrap();
            assert_eq!(drops.get(), 1);

            // Removing hands the value back; unset discards it.
            for k in 0..50u64 {
                drop(table.try_remove(inthash(k), |&x| x == k).unwrap());
            }
            assert_eq!(drops.get(), 51);

            let cloned = table.clone();
            assert_eq!(cloned.len(), 50);
            drop(cloned);
            assert_eq!(drops.get(), 101);
        }
        assert_eq!(drops.get(), 151);
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(0);
        for k in 10..20u64 {
            insert(&mut table, hash_key(&state, k), k, k as i64 + 1);
        }
        unset(&mut table, hash_key(&state, 10), 10);

        let iter = table.iter();
        assert_eq!(iter.len(), 9);
        let mut collected: Vec<u64> = iter.map(|(k, _)| *k).collect();
        collected.sort();
        assert_eq!(collected, (11..20).collect::<Vec<_>>());

        let drained: Vec<(u64, i64)> = table.drain().collect();
        assert_eq!(drained.len(), 9);
        assert_eq!(table.len(), 0);
        assert_eq!(table.tombstones(), 0);
        table.assert_invariants();

        for k in 10..20u64 {
            assert_eq!(get(&table, hash_key(&state, k), k), None);
        }
    }

    #[test]
    fn into_iter_yields_everything() {
        let mut table: HashTable<u64, String> = HashTable::with_capacity(0);
        for k in 0..40u64 {
            table
                .try_insert(inthash(k), k, k.to_string(), |&x| x == k)
                .unwrap();
        }
        let mut all: Vec<(u64, String)> = table.into_iter().collect();
        all.sort();
        assert_eq!(all.len(), 40);
        assert_eq!(all[39], (39, "39".to_string()));
    }

    #[test]
    fn clone_is_independent() {
        let mut table: HashTable<u64, String> = HashTable::with_capacity(0);
        for k in 0..20u64 {
            table
                .try_insert(inthash(k), k, k.to_string(), |&x| x == k)
                .unwrap();
        }
        table.remove(inthash(3), |&x| x == 3);

        let mut cloned = table.clone();
        cloned.assert_invariants();
        assert_eq!(cloned.len(), table.len());
        assert_eq!(cloned.tombstones(), table.tombstones());

        cloned
            .try_insert(inthash(5), 5, "changed".to_string(), |&x| x == 5)
            .unwrap();
        assert_eq!(
            table.find(inthash(5), |&x| x == 5).map(|(_, v)| v.as_str()),
            Some("5")
        );
    }

    #[test]
    fn entry_api() {
        let mut table: HashTable<String, u32> = HashTable::with_capacity(0);
        let state = HashState::default();
        let hash_str = |s: &str| {
            let mut h = state.build_hasher();
            h.write(s.as_bytes());
            h.finish()
        };

        for word in ["a", "b", "a", "c", "a", "b"] {
            *table
                .entry(hash_str(word), |k| k == word)
                .or_insert(word.to_string(), 0) += 1;
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.find(hash_str("a"), |k| k == "a").map(|(_, v)| *v), Some(3));

        assert_eq!(
            table.entry(hash_str("b"), |k| k == "b").and_modify(|v| *v *= 10),
            Some(&mut 20)
        );
        assert_eq!(table.entry(hash_str("z"), |k| k == "z").and_modify(|v| *v += 1), None);

        *table.entry(hash_str("d"), |k| k == "d").or_default("d".to_string()) += 7;
        assert_eq!(table.find(hash_str("d"), |k| k == "d").map(|(_, v)| *v), Some(7));

        match table.entry(hash_str("c"), |k| k == "c") {
            Entry::Occupied(entry) => {
                assert_eq!(entry.key(), "c");
                assert_eq!(entry.remove(), ("c".to_string(), 1));
            }
            Entry::Vacant(_) => unreachable!(),
        }
        assert_eq!(table.len(), 3);
        table.assert_invariants();
    }

    #[test]
    fn reserve_and_shrink_to_fit() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(1);
        table.reserve(100);
        let capacity = table.capacity();
        assert!(sizing::grow_limit(capacity) >= 100);

        for k in 0..100u64 {
            insert(&mut table, inthash(k), k, k as i64);
        }
        assert_eq!(table.capacity(), capacity);

        for k in 0..90u64 {
            table.remove(inthash(k), |&x| x == k);
        }
        table.shrink_to_fit();
        assert_eq!(table.capacity(), sizing::capacity_to_hold(10).unwrap());
        table.assert_invariants();
        for k in 90..100u64 {
            assert_eq!(get(&table, inthash(k), k), Some(k as i64));
        }

        assert_eq!(table.try_reserve(usize::MAX), Err(Error::CapacityOverflow));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(128);
        for k in 0..50u64 {
            insert(&mut table, inthash(k), k, 0);
        }
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 128);
        table.assert_invariants();
    }

    #[test]
    fn zero_sized_values() {
        let mut table: HashTable<u64, ()> = HashTable::with_capacity(0);
        for k in 0..100u64 {
            table.try_insert(inthash(k), k, (), |&x| x == k).unwrap();
        }
        assert_eq!(table.len(), 100);
        assert!(table.find(inthash(42), |&x| x == 42).is_some());
        table.assert_invariants();
    }

    #[test]
    fn stats_report_displacements() {
        let mut table: HashTable<u64, i64> = HashTable::with_capacity(64);
        for k in 0..4u64 {
            insert(&mut table, 0, k, 0);
        }
        assert_eq!(table.probe_histogram(), vec![1, 1, 1, 1]);

        let stats = table.debug_stats();
        assert_eq!(stats.len, 4);
        assert_eq!(stats.max_displacement, 3);
        assert!((stats.mean_displacement - 1.5).abs() < f64::EPSILON);
    }
}
