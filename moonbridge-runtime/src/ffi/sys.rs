//! Raw Lua 5.4 C API bindings
//!
//! The subset of `mlua-sys` the bridge calls, re-exported under one path so
//! the rest of the crate never names the binding crate directly. Signatures,
//! ABI constants and the macro-equivalent helpers (`lua_pop`, `lua_pcall`,
//! `lua_upvalueindex`, ...) all come from the vendored build's bindings.

pub use mlua_sys::{lua_CFunction, lua_State};

// Status codes
pub use mlua_sys::{LUA_ERRERR, LUA_ERRMEM, LUA_ERRRUN, LUA_ERRSYNTAX, LUA_OK, LUA_YIELD};

// Type tags
pub use mlua_sys::{
    LUA_TBOOLEAN, LUA_TFUNCTION, LUA_TLIGHTUSERDATA, LUA_TNIL, LUA_TNUMBER, LUA_TSTRING, LUA_TTABLE,
    LUA_TTHREAD, LUA_TUSERDATA,
};

// Pseudo-indices
pub use mlua_sys::{lua_upvalueindex, LUA_REGISTRYINDEX};

// Garbage collector
pub use mlua_sys::{lua_gc, LUA_GCCOLLECT, LUA_GCCOUNT, LUA_GCCOUNTB};

// State management
pub use mlua_sys::{luaL_newstate, luaL_openlibs, lua_close};

// Stack manipulation
pub use mlua_sys::{lua_absindex, lua_checkstack, lua_gettop, lua_pop, lua_pushvalue, lua_settop};

// Access (stack -> host)
pub use mlua_sys::{
    lua_rawequal, lua_rawlen, lua_toboolean, lua_tolstring, lua_tonumberx, lua_touserdata, lua_type,
};

// Push (host -> stack)
pub use mlua_sys::{
    lua_pushboolean, lua_pushcclosure, lua_pushcfunction, lua_pushlightuserdata, lua_pushlstring,
    lua_pushnil, lua_pushnumber,
};

// Tables and globals
pub use mlua_sys::{
    lua_getglobal, lua_gettable, lua_newtable, lua_next, lua_pushglobaltable, lua_rawget,
    lua_rawset, lua_settable,
};

// Load, call and raise
pub use mlua_sys::{luaL_loadbufferx, lua_error, lua_load, lua_pcall};
