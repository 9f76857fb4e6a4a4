use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map_res, opt},
    sequence::{delimited, preceded, tuple},
    IResult,
};
use uuid::Uuid;

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Register { username: String, word: String, leaderboard: Option<String> },
    User { id: Uuid },
    Top { leaderboard: Option<String>, limit: Option<usize> },
    Battle { id: Uuid },
    Replay { id: Uuid, timestamp: u64 },
    History { id: Uuid },
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_u64(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>())(input)
}

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_uuid(input: &str) -> IResult<&str, Uuid> {
    let (input, _) = opt(char('\''))(input)?;
    let (rest, uuid_str) = take_while1(|c: char| c.is_ascii_hexdigit() || c == '-')(input)?;
    let (rest, _) = opt(char('\''))(rest)?;
    match Uuid::parse_str(uuid_str) {
        Ok(uuid) => Ok((rest, uuid)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

fn in_board(input: &str) -> IResult<&str, Option<String>> {
    opt(preceded(ws(tag_ci("IN")), parse_quoted_string))(input)
}

// --- COMMAND PARSERS ---

fn parse_register(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("REGISTER")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, username) = parse_quoted_string(input)?;
    let (input, _) = multispace1(input)?;
    let (input, word) = parse_quoted_string(input)?;
    let (input, leaderboard) = in_board(input)?;
    Ok((input, Command::Register { username, word, leaderboard }))
}

fn parse_user(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("USER")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_uuid(input)?;
    Ok((input, Command::User { id }))
}

fn parse_top(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("TOP")(input)?;
    let (input, leaderboard) = in_board(input)?;
    let (input, limit) = opt(preceded(ws(tag_ci("LIMIT")), parse_usize))(input)?;
    Ok((input, Command::Top { leaderboard, limit }))
}

fn parse_battle(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("BATTLE"), tag_ci("FIGHT")))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_uuid(input)?;
    Ok((input, Command::Battle { id }))
}

fn parse_replay(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("REPLAY")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_uuid(input)?;
    let (input, (_, timestamp)) = tuple((ws(tag_ci("AT")), parse_u64))(input)?;
    Ok((input, Command::Replay { id, timestamp }))
}

fn parse_history(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HISTORY")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_uuid(input)?;
    Ok((input, Command::History { id }))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_register,
        parse_user,
        parse_top,
        parse_battle,
        parse_replay,
        parse_history,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = if e.input.chars().count() > 20 {
                format!("{}...", e.input.chars().take(20).collect::<String>())
            } else {
                e.input.to_string()
            };
            Err(format!("Invalid syntax near: '{}'", context))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
