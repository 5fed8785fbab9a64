/// The set of member names currently known to the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClusterMembership {
    #[serde(default)]
    pub members: BTreeSet<String>,
}

impl ClusterMembership {
    /// Creates a membership set from a list of member names.
    pub fn new(members: Vec<String>) -> Result<Self> {
        let mut membership = Self::default();
        for member in members {
            membership.add_member(member)?;
        }
        Ok(membership)
    }

    /// Adds a valid member name to the membership.
    pub fn add_member(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GridError::ExecutionError(
                "membership member name must not be empty".to_string(),
            ));
        }
        self.members.insert(name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns a sorted list of all members.
    pub fn all_members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    /// The member owning `key`, stable for a fixed membership.
    pub fn owner_of(&self, key: &str) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let slot = stable_slot_for(key, self.len() as u32) as usize;
        self.members.iter().nth(slot).cloned()
    }
}
