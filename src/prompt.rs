//! Voting prompt construction

use std::fmt::Write;

use crate::cardinal::Cardinal;
use crate::conclave::Frontrunners;
use crate::ledger::RoundOutcome;

/// System role sent with every ballot request
pub const SYSTEM_PROMPT: &str = "You are simulating a cardinal elector in a papal conclave.";

/// Everything a cardinal is told before casting a ballot
pub struct BallotContext<'a> {
    pub round_number: u32,
    pub frontrunners: &'a Frontrunners,
    pub previous_round: Option<&'a RoundOutcome>,
    pub eligible: &'a [String],
}

/// Build the user prompt for `cardinal`
pub fn voting_prompt(cardinal: &Cardinal, ctx: &BallotContext<'_>) -> String {
    let mut prompt = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(prompt, "You are Cardinal {}, an elector in the papal conclave.", cardinal.name);
    let _ = writeln!(prompt, "\nYour background:\n{}", cardinal.bio.trim());
    let _ = writeln!(
        prompt,
        "\nPolitical leaning score: {} (-1.0 is very conservative, 1.0 is very liberal)",
        cardinal.political_leaning
    );

    let _ = writeln!(prompt, "\nState of the conclave:");
    let _ = writeln!(prompt, "- Round: {}", ctx.round_number);
    let _ = writeln!(prompt, "- Frontrunners and their support in the previous round:");
    if ctx.frontrunners.is_empty() {
        let _ = writeln!(prompt, "  * No clear frontrunners yet");
    } else {
        for (name, ratio) in ctx.frontrunners.iter() {
            let _ = writeln!(prompt, "  * {}: {:.1}% support", name, ratio * 100.0);
        }
    }

    if let Some(previous) = ctx.previous_round {
        let _ = writeln!(prompt, "\nResults of round {}:", previous.round_number);
        for (name, votes) in previous.votes.iter() {
            let _ = writeln!(prompt, "  * {name}: {votes} votes");
        }
    }

    if let Some(last) = cardinal.last_vote() {
        let _ = writeln!(prompt, "\nIn round {} you voted for: {}", last.round, last.voted_for);
    }

    let _ = writeln!(prompt, "\nEligible cardinals:");
    for name in ctx.eligible {
        let _ = writeln!(prompt, "- {name}");
    }

    prompt.push_str(
        "\nWeigh the following when choosing:\n\
         1. Your own political leaning and background\n\
         2. The current frontrunners and their support\n\
         3. The previous round's results, if any\n\
         4. Your previous vote, if any\n\
         5. The need for a pope who can lead the Church effectively\n\
         6. Shared continent, language, or outlook make a candidate more appealing\n\
         7. Candidates who are too old or too young are less appealing\n\
         8. Candidates with a history of scandal or controversy are less appealing\n\
         \n\
         Which cardinal do you vote for? Answer with ONLY the name exactly as it appears \
         in the eligible cardinals list, without the title \"Cardinal\" and without any \
         other text.\n",
    );

    prompt
}
