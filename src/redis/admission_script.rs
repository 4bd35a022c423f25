use std::sync::LazyLock;

use redis::Script;

use crate::{CasementError, ScriptStore, Verdict, WindowDurationSeconds, WindowLimit};

// KEYS: subjects. ARGV: limit, duration, [now]. Without ARGV[3] the store clock is used.
// Every subject is incremented and its expiry refreshed before the verdict is returned.
// Integers are formatted with %d; plain concatenation of a Lua number switches to
// exponent notation from 1e14.
const ADMISSION_LUA: &str = r#"
local limit = tonumber(ARGV[1])
local duration = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
if now == nil then
    now = tonumber(redis.call("TIME")[1])
end

local bucket = string.format(":%d:%d", duration, math.floor(now / duration))
local verdict = 0

for _, id in ipairs(KEYS) do
    local key = id .. bucket
    local count = redis.call("INCR", key)
    redis.call("EXPIRE", key, string.format("%d", duration))

    if count > limit then
        verdict = 1
    end
end

return verdict
"#;

static ADMISSION_SCRIPT: LazyLock<AdmissionScript> = LazyLock::new(|| AdmissionScript {
    script: Script::new(ADMISSION_LUA),
});

/// The fixed-window check-and-increment routine executed atomically by the store.
///
/// The script text and its SHA1 digest are computed once per process and
/// shared read-only by every limiter. Invocation is by digest only; uploading
/// is the job of [`ScriptRegistrar`](crate::ScriptRegistrar).
#[derive(Debug)]
pub struct AdmissionScript {
    script: Script,
}

impl AdmissionScript {
    /// The process-wide instance.
    pub fn global() -> &'static AdmissionScript {
        &ADMISSION_SCRIPT
    }

    /// Lua source uploaded to the store.
    pub fn source(&self) -> &'static str {
        ADMISSION_LUA
    }

    /// Hex SHA1 digest of [`source`](Self::source), the invocation reference.
    pub fn hash(&self) -> &str {
        self.script.get_hash()
    }

    /// Increment the current-window counter of every key in `keys` and decide.
    ///
    /// Returns [`Verdict::Deny`] if any counter went past `limit`. All keys are
    /// incremented even when an earlier one is already over, so every
    /// dimension pays for the attempt. `now` is Unix seconds; `None` lets the
    /// store's clock pick the window.
    ///
    /// A single round trip. Fails with [`CasementError::ScriptMissing`] if the
    /// store has lost the script.
    pub async fn check<S>(
        &self,
        store: &S,
        keys: &[String],
        limit: WindowLimit,
        duration: WindowDurationSeconds,
        now: Option<i64>,
    ) -> Result<Verdict, CasementError>
    where
        S: ScriptStore + ?Sized,
    {
        let args = match now {
            Some(now) => vec![*limit, *duration, now],
            None => vec![*limit, *duration],
        };

        let reply = store.eval_sha(self.hash(), keys, &args).await?;

        Verdict::try_from(reply).map_err(CasementError::UnexpectedVerdict)
    } // end method check
}
