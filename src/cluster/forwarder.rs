/// Addressing capability the dispatcher uses to reach members.
#[async_trait]
pub trait MemberForwarder: Send + Sync {
    /// Lists every currently known member, sorted by name.
    async fn members(&self) -> Result<Vec<String>>;

    /// Runs `function_id` on `member` and returns its last result.
    async fn invoke(
        &self,
        member: &str,
        function_id: &str,
        invocation: FunctionInvocation,
    ) -> Result<Option<Value>>;

    /// Attributes of `function_id` as registered on `member`, if registered.
    async fn function_attributes(
        &self,
        member: &str,
        function_id: &str,
    ) -> Result<Option<FunctionAttributes>>;

    /// Sorted ids of the functions registered on `member`.
    async fn function_ids(&self, member: &str) -> Result<Vec<String>>;
}
