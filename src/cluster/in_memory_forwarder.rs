/// An in-process implementation of `MemberForwarder`.
///
/// Simulates the network by invoking the target member's registry directly,
/// on a blocking task so long-running function bodies do not stall the runtime.
#[derive(Clone, Default)]
pub struct InMemoryMemberForwarder {
    members: Arc<RwLock<HashMap<String, Arc<ClusterMember>>>>,
}

impl InMemoryMemberForwarder {
    /// Creates a new, empty forwarder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member with the forwarder, enabling it to receive invocations.
    pub async fn register_member(&self, member: Arc<ClusterMember>) -> Result<()> {
        let mut members = self.members.write().await;
        members.insert(member.name().to_string(), member);
        Ok(())
    }

    /// Removes a member, e.g. when it leaves the cluster.
    pub async fn remove_member(&self, name: &str) -> Option<Arc<ClusterMember>> {
        self.members.write().await.remove(name)
    }

    /// Returns the registered member called `name`.
    pub async fn member(&self, name: &str) -> Result<Arc<ClusterMember>> {
        let members = self.members.read().await;
        members
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::MemberNotFound(name.to_string()))
    }

    /// Sum of `function_id` invocation counters over every registered member.
    pub async fn total_invocation_count(&self, function_id: &str) -> Result<u64> {
        let members = self.members.read().await;
        let mut total = 0;
        for member in members.values() {
            total += member.invocation_count(function_id)?;
        }
        Ok(total)
    }
}

#[async_trait]
impl MemberForwarder for InMemoryMemberForwarder {
    async fn members(&self) -> Result<Vec<String>> {
        let members = self.members.read().await;
        let membership = ClusterMembership::new(members.keys().cloned().collect())?;
        Ok(membership.all_members())
    }

    async fn invoke(
        &self,
        member: &str,
        function_id: &str,
        invocation: FunctionInvocation,
    ) -> Result<Option<Value>> {
        let target = self.member(member).await?;
        let function_id = function_id.to_string();
        tokio::task::spawn_blocking(move || target.execute(&function_id, invocation))
            .await
            .map_err(|err| GridError::ExecutionError(format!("member invocation join: {}", err)))?
    }

    async fn function_attributes(
        &self,
        member: &str,
        function_id: &str,
    ) -> Result<Option<FunctionAttributes>> {
        let target = self.member(member).await?;
        Ok(target
            .registry()
            .lookup(function_id)?
            .map(|function| function.attributes()))
    }

    async fn function_ids(&self, member: &str) -> Result<Vec<String>> {
        self.member(member).await?.registry().function_ids()
    }
}
